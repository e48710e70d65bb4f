use crate::backend::TableEngine;
use crate::error::Result;
use crate::model::{Item, ItemId, Query};

use super::{sgi, Application, RewriteEffect, StepContext, StepInput, Strategy};

/// Turns a plain vertex into a composite one holding its matching objects,
/// one subgraph per object.
///
/// Applies to an unannotated plain vertex none of whose edges carries a
/// provenance marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct GetVertex;

impl Strategy for GetVertex {
    fn name(&self) -> &'static str {
        "get-vertex"
    }

    fn description(&self) -> &'static str {
        "get vertex"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>> {
        let item = query.item(vertex)?;
        if !item.is_vertex() || item.is_composite() || item.is_annotated() {
            return Ok(Vec::new());
        }
        for edge in query.vertex_edges(vertex)? {
            if query.item(edge)?.is_marked() {
                return Ok(Vec::new());
            }
        }
        Ok(vec![Application::new(query, &[vertex])?])
    }

    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect> {
        let vertex = application.item(0)?;
        let mut copy = query.clone();
        let replacement = Item::composite(copy.item(vertex)?.names().iter().cloned())?;
        let output = copy.replace_vertex(vertex, replacement)?;
        Ok(RewriteEffect { query: copy, output })
    }

    fn generate(&self, input: &StepInput<'_>, ctx: &mut StepContext<'_, '_>) -> Result<Option<String>> {
        let vertex = input.before.item(input.application.item(0)?)?;
        let objects = sgi::single_vertex(ctx.backend, vertex.condition(), &vertex.catenated_name())?;
        if let Err(err) = ctx.registry.put(&input.effect.output, objects, None) {
            let _ = ctx.backend.release(objects);
            return Err(err);
        }
        Ok(Some(input.effect.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, TableEngine};
    use crate::exec::TempTableRegistry;
    use crate::model::{Annotation, Condition};

    #[test]
    fn skips_annotated_and_composite_vertices() {
        let mut q = Query::new("g", "");
        let root = q.root();
        let a = q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
        let b = q
            .add_vertex(root, Item::vertex("B").unwrap().with_annotation(Annotation::at_least(1)))
            .unwrap();
        let c = q.add_vertex(root, Item::composite(["C"]).unwrap()).unwrap();
        assert_eq!(GetVertex.applications(&q, a).unwrap().len(), 1);
        assert!(GetVertex.applications(&q, b).unwrap().is_empty());
        assert!(GetVertex.applications(&q, c).unwrap().is_empty());
    }

    #[test]
    fn apply_keeps_edges_and_container() {
        let mut q = Query::new("g", "");
        let root = q.root();
        let a = q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
        q.add_vertex(root, Item::vertex("B").unwrap()).unwrap();
        q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap()).unwrap();

        let app = GetVertex.applications(&q, a).unwrap().remove(0);
        let effect = GetVertex.apply(&q, &app).unwrap();
        let out = effect.query.item(effect.output).unwrap();
        assert!(out.is_composite());
        assert_eq!(effect.query.vertex_edges(effect.output).unwrap().len(), 1);
        assert!(!q.item(a).unwrap().is_composite());
    }

    #[test]
    fn generate_stores_matching_objects() {
        let backend = MemoryBackend::new();
        backend.add_object(1, [("kind", "a")]);
        backend.add_object(2, [("kind", "b")]);
        let mut q = Query::new("g", "");
        let root = q.root();
        let a = q
            .add_vertex(root, Item::vertex("A").unwrap().with_condition(Condition::eq("kind", "a").unwrap()))
            .unwrap();
        let app = GetVertex.applications(&q, a).unwrap().remove(0);
        let (_, record) = GetVertex.apply(&q, &app).unwrap().into_parts().unwrap();

        let mut registry = TempTableRegistry::new(&backend);
        let mut ctx = StepContext {
            backend: &backend,
            registry: &mut registry,
        };
        let input = StepInput {
            before: &q,
            application: &app,
            effect: &record,
        };
        assert_eq!(GetVertex.generate(&input, &mut ctx).unwrap(), Some("A".to_owned()));
        let tables = registry.require("A").unwrap();
        assert_eq!(backend.row_count(tables.objects).unwrap(), 1);
        assert_eq!(backend.row_count(tables.links).unwrap(), 0);
    }
}
