use tracing::debug;

use crate::backend::{RowFilter, TableEngine, ITEM_ID, SUBG_ID};
use crate::error::{Error, Result};
use crate::exec::{ScratchTables, SubgraphTables};
use crate::model::{CompareOp, ItemId, Query};

use super::{sgi, Application, RewriteEffect, StepContext, StepInput, Strategy};

/// Enforces the upper bound recorded by a provenance marker and clears it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApplyUpperLimit;

impl Strategy for ApplyUpperLimit {
    fn name(&self) -> &'static str {
        "apply-upper-limit"
    }

    fn description(&self) -> &'static str {
        "apply upper limit of absorbed annotated vertex"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>> {
        let item = query.item(vertex)?;
        if !item.is_composite() || item.is_annotated() || !item.is_marked() {
            return Ok(Vec::new());
        }
        Ok(vec![Application::new(query, &[vertex])?])
    }

    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect> {
        let vertex = application.item(0)?;
        let mut copy = query.clone();
        copy.item_mut(vertex)?.set_provenance(None)?;
        Ok(RewriteEffect { query: copy, output: vertex })
    }

    fn generate(&self, input: &StepInput<'_>, ctx: &mut StepContext<'_, '_>) -> Result<Option<String>> {
        let vertex = input.before.item(input.application.item(0)?)?;
        let marker = vertex.provenance().ok_or_else(|| {
            Error::invalid_state(format!("'{}' carries no provenance marker", vertex.catenated_name()))
        })?;
        let Some(max) = marker.max() else {
            return Ok(Some(input.effect.output.clone()));
        };

        let backend = ctx.backend;
        let mut scratch = ScratchTables::new(backend);
        let current = ctx.registry.require(&vertex.catenated_name())?;
        let named = sgi::named_rows(backend, &mut scratch, current.objects, marker.item())?;
        let instances = scratch.track(backend.distinct(named, &[SUBG_ID, ITEM_ID])?);
        let counts = scratch.track(backend.count_by(instances, &[SUBG_ID], sgi::COUNT)?);
        let over = scratch.track(backend.filter(
            counts,
            &RowFilter::column_value(sgi::COUNT, CompareOp::Gt, i64::from(max)),
        )?);
        let objects = scratch.track(backend.anti_join(current.objects, over, &[(SUBG_ID, SUBG_ID)])?);
        let links = scratch.track(backend.anti_join(current.links, over, &[(SUBG_ID, SUBG_ID)])?);
        debug!(
            output = %input.effect.output,
            item = marker.item(),
            max,
            dropped = backend.row_count(over)?,
            "apply_upper_limit.generated"
        );
        let tables = SubgraphTables {
            objects: scratch.keep(objects),
            links: scratch.keep(links),
        };
        ctx.registry.replace(&input.effect.output, tables)?;
        Ok(Some(input.effect.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::exec::TempTableRegistry;
    use crate::model::{Item, Provenance};
    use crate::value::Value;

    fn marked(max: u32) -> (Query, ItemId) {
        let mut q = Query::new("limit", "");
        let root = q.root();
        let a = q.add_vertex(root, Item::composite(["A", "B", "Y"]).unwrap()).unwrap();
        q.item_mut(a)
            .unwrap()
            .set_provenance(Some(Provenance::new("B", "B", Some(max)).unwrap()))
            .unwrap();
        (q, a)
    }

    #[test]
    fn apply_clears_the_marker() {
        let (q, a) = marked(1);
        assert!(!q.is_consolidated());
        let app = ApplyUpperLimit.applications(&q, a).unwrap().remove(0);
        let effect = ApplyUpperLimit.apply(&q, &app).unwrap();
        assert!(effect.query.is_consolidated());
        assert!(ApplyUpperLimit.applications(&effect.query, a).unwrap().is_empty());
    }

    #[test]
    fn drops_subgraphs_over_the_limit() {
        let backend = MemoryBackend::new();
        backend.insert_container(
            "seed",
            &[(1, 1, "A"), (2, 1, "B"), (3, 1, "B"), (4, 2, "A"), (5, 2, "B")],
            &[(10, 1, "Y"), (11, 1, "Y"), (12, 2, "Y")],
        )
        .unwrap();
        let names = vec!["A".to_owned(), "B".to_owned(), "Y".to_owned()];
        let seeded = sgi::cached_tables(&backend, "seed", &names).unwrap();

        let (q, a) = marked(1);
        let app = ApplyUpperLimit.applications(&q, a).unwrap().remove(0);
        let (_, record) = ApplyUpperLimit.apply(&q, &app).unwrap().into_parts().unwrap();
        let mut registry = TempTableRegistry::new(&backend);
        registry.replace("A.B.Y", seeded).unwrap();
        let mut ctx = StepContext {
            backend: &backend,
            registry: &mut registry,
        };
        let input = StepInput {
            before: &q,
            application: &app,
            effect: &record,
        };
        ApplyUpperLimit.generate(&input, &mut ctx).unwrap();

        let tables = registry.require("A.B.Y").unwrap();
        let subgraphs: Vec<Value> = backend
            .table_rows(tables.objects)
            .unwrap()
            .into_iter()
            .map(|r| r[SUBG_ID].clone())
            .collect();
        assert_eq!(subgraphs, vec![Value::Int(2), Value::Int(2)]);
        assert_eq!(backend.row_count(tables.links).unwrap(), 1);
        drop(registry);
        assert_eq!(backend.live_tables(), 0);
    }
}
