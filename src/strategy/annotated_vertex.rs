use tracing::debug;

use crate::backend::{JoinColumn, RowFilter, TableEngine, LINK_ID, SGI_COLUMNS, SUBG_ID};
use crate::error::{Error, Result};
use crate::exec::ScratchTables;
use crate::model::{CompareOp, ItemId, Provenance, Query};

use super::{sgi, Application, RewriteEffect, StepContext, StepInput, Strategy};

/// Absorbs an annotated vertex hanging off a composite vertex by a single
/// annotated edge.
///
/// A subgraph of the composite survives when enough instances of the
/// absorbed vertex are joined to it by a qualifying number of links. An
/// upper bound on the absorbed vertex is not checked here: it is left as a
/// provenance marker for [`super::ApplyUpperLimit`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AbsorbAnnotatedVertex;

impl Strategy for AbsorbAnnotatedVertex {
    fn name(&self) -> &'static str {
        "absorb-annotated-vertex"
    }

    fn description(&self) -> &'static str {
        "absorb annotated vertex into consolidated vertex"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>> {
        let item = query.item(vertex)?;
        if !item.is_composite() || item.is_annotated() || item.is_marked() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for edge in query.vertex_edges(vertex)? {
            let edge_item = query.item(edge)?;
            let Some(other) = edge_item.as_edge().and_then(|e| e.other_endpoint(vertex)) else {
                continue;
            };
            if other == vertex
                || !edge_item.is_annotated()
                || edge_item.is_marked()
                || query.crosses_boundary(edge)?
            {
                continue;
            }
            let absorbed = query.item(other)?;
            if absorbed.is_annotated() && !absorbed.is_marked() && query.vertex_edges(other)?.len() == 1 {
                out.push(Application::new(query, &[vertex, edge, other])?);
            }
        }
        Ok(out)
    }

    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect> {
        let (kept, edge, absorbed) = (application.item(0)?, application.item(1)?, application.item(2)?);
        let mut copy = query.clone();
        let absorbed_item = copy.item(absorbed)?;
        let marker = match absorbed_item.annotation().and_then(|a| a.max()) {
            Some(max) => {
                let endpoint = copy
                    .item(edge)?
                    .as_edge()
                    .and_then(|e| e.endpoint_name_in(absorbed_item.names()))
                    .ok_or_else(|| Error::invalid_state("edge does not reach the absorbed vertex"))?;
                Some(Provenance::new(absorbed_item.catenated_name(), endpoint, Some(max))?)
            }
            None => None,
        };
        let mut names = absorbed_item.names().to_vec();
        names.extend(copy.item(edge)?.names().iter().cloned());

        copy.absorb_edge_and_vertex(edge, absorbed)?;
        copy.add_names(kept, &names)?;
        if marker.is_some() {
            copy.item_mut(kept)?.set_provenance(marker)?;
        }
        Ok(RewriteEffect { query: copy, output: kept })
    }

    fn generate(&self, input: &StepInput<'_>, ctx: &mut StepContext<'_, '_>) -> Result<Option<String>> {
        let before = input.before;
        let (kept_id, absorbed_id) = (input.application.item(0)?, input.application.item(2)?);
        let edge = before.item(input.application.item(1)?)?;
        let data = edge
            .as_edge()
            .ok_or_else(|| Error::invalid_state(format!("'{}' is not an edge", edge.catenated_name())))?;
        let edge_annotation = edge.annotation().unwrap_or_default();
        let min = before
            .item(absorbed_id)?
            .annotation()
            .and_then(|a| a.min())
            .unwrap_or(0);

        let backend = ctx.backend;
        let mut scratch = ScratchTables::new(backend);
        let kept = sgi::vertex_tables(before, kept_id, ctx, &mut scratch)?;
        let absorbed = sgi::vertex_tables(before, absorbed_id, ctx, &mut scratch)?;

        let kept_is_source = before.item(kept_id)?.has_name(data.from_name());
        let (source, target, kept_col, absorbed_col) = if kept_is_source {
            (kept, absorbed, sgi::S_FROM, sgi::S_TO)
        } else {
            (absorbed, kept, sgi::S_TO, sgi::S_FROM)
        };
        let from_rows = sgi::named_rows(backend, &mut scratch, source.objects, data.from_name())?;
        let to_rows = sgi::named_rows(backend, &mut scratch, target.objects, data.to_name())?;
        let matches = sgi::link_matches(backend, &mut scratch, edge, from_rows, to_rows, false)?;

        // Pairs whose link count the edge admits.
        let counts = scratch.track(backend.count_by(matches, &[sgi::S_FROM, sgi::S_TO], sgi::COUNT)?);
        let admitted = scratch.track(backend.filter(counts, &sgi::within(sgi::COUNT, edge_annotation))?);
        let pairs = scratch.track(backend.distinct(admitted, &[sgi::S_FROM, sgi::S_TO])?);

        let (survivors, survivor_col) = if min > 0 {
            let per_kept = scratch.track(backend.count_by(pairs, &[kept_col], sgi::COUNT)?);
            let filter = RowFilter::column_value(sgi::COUNT, CompareOp::Ge, i64::from(min));
            (scratch.track(backend.filter(per_kept, &filter)?), kept_col)
        } else {
            (scratch.track(backend.distinct(kept.objects, &[SUBG_ID])?), SUBG_ID)
        };
        let live_pairs = scratch.track(backend.join(
            pairs,
            survivors,
            &[(kept_col, survivor_col)],
            &[
                JoinColumn::left(sgi::S_FROM, sgi::S_FROM),
                JoinColumn::left(sgi::S_TO, sgi::S_TO),
            ],
        )?);
        let live_links = scratch.track(backend.join(
            matches,
            live_pairs,
            &[(sgi::S_FROM, sgi::S_FROM), (sgi::S_TO, sgi::S_TO)],
            &[
                JoinColumn::left(LINK_ID, LINK_ID),
                JoinColumn::left(kept_col, kept_col),
            ],
        )?);

        let edge_rows = scratch.track(sgi::edge_rows(backend, live_links, kept_col, &edge.catenated_name())?);
        let kept_objects = scratch.track(sgi::keep_subgraphs(backend, kept.objects, survivors, survivor_col)?);
        let kept_links = scratch.track(sgi::keep_subgraphs(backend, kept.links, survivors, survivor_col)?);
        let moved_objects = scratch.track(sgi::recode(backend, absorbed.objects, live_pairs, absorbed_col, kept_col)?);
        let moved_links = scratch.track(sgi::recode(backend, absorbed.links, live_pairs, absorbed_col, kept_col)?);

        let objects = scratch.track(backend.union(&[kept_objects, moved_objects])?);
        let links = scratch.track(backend.union(&[kept_links, moved_links, edge_rows])?);
        let objects = scratch.track(backend.distinct(objects, &SGI_COLUMNS)?);
        let links = scratch.track(backend.distinct(links, &SGI_COLUMNS)?);
        debug!(
            output = %input.effect.output,
            subgraphs = backend.row_count(survivors)?,
            min,
            "absorb_annotated_vertex.generated"
        );
        ctx.registry.put(&input.effect.output, scratch.keep(objects), Some(scratch.keep(links)))?;
        Ok(Some(input.effect.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::backend::{MemoryBackend, ITEM_ID, NAME};
    use crate::exec::TempTableRegistry;
    use crate::model::{Annotation, Condition, Item};
    use crate::value::Value;

    fn star(absorbed: Annotation) -> Query {
        let mut q = Query::new("star", "");
        let root = q.root();
        q.add_vertex(root, Item::composite(["A"]).unwrap()).unwrap();
        q.add_vertex(
            root,
            Item::vertex("B")
                .unwrap()
                .with_condition(Condition::eq("kind", "b").unwrap())
                .with_annotation(absorbed),
        )
        .unwrap();
        q.add_edge(
            root,
            Item::edge("Y", "A", "B", true).unwrap().with_annotation(Annotation::at_least(1)),
        )
        .unwrap();
        q
    }

    type Rows = Vec<(i64, i64, String)>;

    fn run(q: &Query) -> (Rows, Rows) {
        let backend = MemoryBackend::new();
        backend.add_object(1, [("kind", "a")]);
        backend.add_object(2, [("kind", "b")]);
        backend.add_object(3, [("kind", "a")]);
        backend.add_object(4, [("kind", "b")]);
        backend.add_link(10, 1, 2, [("type", "x")]);
        backend.add_link(11, 1, 4, [("type", "x")]);

        let a = q.item_by_name("A").unwrap();
        let app = AbsorbAnnotatedVertex.applications(q, a).unwrap().remove(0);
        let (_, record) = AbsorbAnnotatedVertex.apply(q, &app).unwrap().into_parts().unwrap();
        let mut registry = TempTableRegistry::new(&backend);
        let objects = sgi::single_vertex(&backend, Some(&Condition::eq("kind", "a").unwrap()), "A").unwrap();
        registry.put("A", objects, None).unwrap();
        let mut ctx = StepContext {
            backend: &backend,
            registry: &mut registry,
        };
        let input = StepInput {
            before: q,
            application: &app,
            effect: &record,
        };
        AbsorbAnnotatedVertex.generate(&input, &mut ctx).unwrap();
        let tables = registry.require("A.B.Y").unwrap();
        let collect = |table| -> Rows {
            backend
                .table_rows(table)
                .unwrap()
                .into_iter()
                .map(|r| {
                    let name = match &r[NAME] {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (r[SUBG_ID].as_int().unwrap(), r[ITEM_ID].as_int().unwrap(), name)
                })
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        (collect(tables.objects), collect(tables.links))
    }

    #[test]
    fn requires_degree_one_annotated_vertex() {
        let q = star(Annotation::at_least(1));
        let a = q.item_by_name("A").unwrap();
        assert_eq!(AbsorbAnnotatedVertex.applications(&q, a).unwrap().len(), 1);

        let mut busy = star(Annotation::at_least(1));
        let root = busy.root();
        busy.add_vertex(root, Item::vertex("C").unwrap()).unwrap();
        busy.add_edge(root, Item::edge("Z", "B", "C", true).unwrap()).unwrap();
        assert!(AbsorbAnnotatedVertex.applications(&busy, a).unwrap().is_empty());
    }

    #[test]
    fn upper_bound_leaves_a_marker() {
        let q = star(Annotation::range(1, 1).unwrap());
        let a = q.item_by_name("A").unwrap();
        let app = AbsorbAnnotatedVertex.applications(&q, a).unwrap().remove(0);
        let effect = AbsorbAnnotatedVertex.apply(&q, &app).unwrap();
        let out = effect.query.item(effect.output).unwrap();
        assert_eq!(out.catenated_name(), "A.B.Y");
        let marker = out.provenance().unwrap();
        assert_eq!(marker.item(), "B");
        assert_eq!(marker.max(), Some(1));
        assert!(!effect.query.is_consolidated());

        let open = star(Annotation::at_least(1));
        let app = AbsorbAnnotatedVertex.applications(&open, a).unwrap().remove(0);
        let effect = AbsorbAnnotatedVertex.apply(&open, &app).unwrap();
        assert!(effect.query.is_consolidated());
    }

    #[test]
    fn minimum_drops_subgraphs_without_enough_instances() {
        let (objects, links) = run(&star(Annotation::at_least(2)));
        assert_eq!(
            objects,
            vec![(1, 1, "A".to_owned()), (1, 2, "B".to_owned()), (1, 4, "B".to_owned())]
        );
        assert_eq!(links, vec![(1, 10, "Y".to_owned()), (1, 11, "Y".to_owned())]);
    }

    #[test]
    fn optional_vertex_keeps_every_subgraph() {
        let (objects, links) = run(&star(Annotation::new(Some(0), None).unwrap()));
        assert_eq!(
            objects,
            vec![
                (1, 1, "A".to_owned()),
                (1, 2, "B".to_owned()),
                (1, 4, "B".to_owned()),
                (2, 3, "A".to_owned())
            ]
        );
        assert_eq!(links.len(), 2);
    }
}
