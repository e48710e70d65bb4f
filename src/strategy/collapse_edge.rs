use tracing::debug;

use crate::backend::{JoinColumn, TableEngine, LINK_ID};
use crate::error::{Error, Result};
use crate::exec::ScratchTables;
use crate::model::{ItemId, Query};

use super::{sgi, Application, RewriteEffect, StepContext, StepInput, Strategy};

/// Merges two composite vertices joined by an edge into one.
///
/// Every pair of subgraphs connected by a matching link becomes a new
/// subgraph. When the edge is annotated, a pair qualifies only if the number
/// of links joining it lies within the annotation.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollapseEdge;

fn eligible(query: &Query, vertex: ItemId) -> Result<bool> {
    let item = query.item(vertex)?;
    Ok(item.is_composite() && !item.is_annotated() && !item.is_marked())
}

impl Strategy for CollapseEdge {
    fn name(&self) -> &'static str {
        "collapse-edge"
    }

    fn description(&self) -> &'static str {
        "merge two consolidated vertices along an edge"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>> {
        if !eligible(query, vertex)? {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for edge in query.vertex_edges(vertex)? {
            let item = query.item(edge)?;
            let Some(other) = item.as_edge().and_then(|e| e.other_endpoint(vertex)) else {
                continue;
            };
            if other == vertex || item.is_marked() || query.crosses_boundary(edge)? {
                continue;
            }
            if eligible(query, other)? {
                out.push(Application::new(query, &[vertex, edge, other])?);
            }
        }
        Ok(out)
    }

    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect> {
        let (kept, edge, absorbed) = (application.item(0)?, application.item(1)?, application.item(2)?);
        let mut copy = query.clone();
        let mut names = copy.item(absorbed)?.names().to_vec();
        names.extend(copy.item(edge)?.names().iter().cloned());
        copy.absorb_edge_and_vertex(edge, absorbed)?;
        copy.add_names(kept, &names)?;
        Ok(RewriteEffect { query: copy, output: kept })
    }

    fn generate(&self, input: &StepInput<'_>, ctx: &mut StepContext<'_, '_>) -> Result<Option<String>> {
        let before = input.before;
        let (left, right) = (input.application.item(0)?, input.application.item(2)?);
        let edge = before.item(input.application.item(1)?)?;
        let data = edge
            .as_edge()
            .ok_or_else(|| Error::invalid_state(format!("'{}' is not an edge", edge.catenated_name())))?;

        let backend = ctx.backend;
        let mut scratch = ScratchTables::new(backend);
        let left_tables = sgi::vertex_tables(before, left, ctx, &mut scratch)?;
        let right_tables = sgi::vertex_tables(before, right, ctx, &mut scratch)?;

        // Orient the match so that s_from belongs to the edge's source side.
        let left_is_source = before.item(left)?.has_name(data.from_name());
        let (source, target) = if left_is_source {
            (left_tables, right_tables)
        } else {
            (right_tables, left_tables)
        };
        let from_rows = sgi::named_rows(backend, &mut scratch, source.objects, data.from_name())?;
        let to_rows = sgi::named_rows(backend, &mut scratch, target.objects, data.to_name())?;
        let matches = sgi::link_matches(backend, &mut scratch, edge, from_rows, to_rows, false)?;

        let pairs = match edge.annotation() {
            Some(annotation) => {
                let counts = scratch.track(backend.count_by(matches, &[sgi::S_FROM, sgi::S_TO], sgi::COUNT)?);
                let qualified = scratch.track(backend.filter(counts, &sgi::within(sgi::COUNT, annotation))?);
                scratch.track(backend.distinct(qualified, &[sgi::S_FROM, sgi::S_TO])?)
            }
            None => scratch.track(backend.distinct(matches, &[sgi::S_FROM, sgi::S_TO])?),
        };
        backend.add_row_number(pairs, sgi::NEW_SUBG)?;

        let links_of_pairs = scratch.track(backend.join(
            matches,
            pairs,
            &[(sgi::S_FROM, sgi::S_FROM), (sgi::S_TO, sgi::S_TO)],
            &[
                JoinColumn::left(LINK_ID, LINK_ID),
                JoinColumn::right(sgi::NEW_SUBG, sgi::NEW_SUBG),
            ],
        )?);
        let edge_rows = scratch.track(sgi::edge_rows(backend, links_of_pairs, sgi::NEW_SUBG, &edge.catenated_name())?);

        let mut object_parts = Vec::with_capacity(2);
        let mut link_parts = vec![edge_rows];
        for (side, column) in [(source, sgi::S_FROM), (target, sgi::S_TO)] {
            object_parts.push(scratch.track(sgi::recode(backend, side.objects, pairs, column, sgi::NEW_SUBG)?));
            link_parts.push(scratch.track(sgi::recode(backend, side.links, pairs, column, sgi::NEW_SUBG)?));
        }
        let objects = scratch.track(backend.union(&object_parts)?);
        let links = scratch.track(backend.union(&link_parts)?);
        debug!(
            output = %input.effect.output,
            subgraphs = backend.row_count(pairs)?,
            "collapse_edge.generated"
        );
        ctx.registry.put(&input.effect.output, scratch.keep(objects), Some(scratch.keep(links)))?;
        Ok(Some(input.effect.output.clone()))
    }
}
