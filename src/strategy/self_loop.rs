use tracing::debug;

use crate::backend::TableEngine;
use crate::error::{Error, Result};
use crate::exec::{ScratchTables, SubgraphTables};
use crate::model::{ItemId, Query};

use super::{sgi, Application, RewriteEffect, StepContext, StepInput, Strategy};

/// Absorbs an unannotated self-loop into its composite vertex, keeping only
/// subgraphs where a matching link joins the loop's two ends.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbsorbSelfLoop;

impl Strategy for AbsorbSelfLoop {
    fn name(&self) -> &'static str {
        "absorb-self-loop"
    }

    fn description(&self) -> &'static str {
        "absorb self-loop into consolidated vertex"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>> {
        let item = query.item(vertex)?;
        if !item.is_composite() || item.is_annotated() || item.is_marked() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for edge in query.self_loops(vertex)? {
            let loop_item = query.item(edge)?;
            if !loop_item.is_annotated() && !loop_item.is_marked() {
                out.push(Application::new(query, &[vertex, edge])?);
            }
        }
        Ok(out)
    }

    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect> {
        let (vertex, edge) = (application.item(0)?, application.item(1)?);
        let mut copy = query.clone();
        let removed = copy.remove_edge(edge)?;
        copy.add_names(vertex, removed.names())?;
        Ok(RewriteEffect { query: copy, output: vertex })
    }

    fn generate(&self, input: &StepInput<'_>, ctx: &mut StepContext<'_, '_>) -> Result<Option<String>> {
        let before = input.before;
        let vertex = input.application.item(0)?;
        let edge = before.item(input.application.item(1)?)?;
        let data = edge
            .as_edge()
            .ok_or_else(|| Error::invalid_state(format!("'{}' is not an edge", edge.catenated_name())))?;

        let backend = ctx.backend;
        let mut scratch = ScratchTables::new(backend);
        let current = sgi::vertex_tables(before, vertex, ctx, &mut scratch)?;
        let from_rows = sgi::named_rows(backend, &mut scratch, current.objects, data.from_name())?;
        let to_rows = sgi::named_rows(backend, &mut scratch, current.objects, data.to_name())?;
        let matches = sgi::link_matches(backend, &mut scratch, edge, from_rows, to_rows, true)?;

        let kept = scratch.track(backend.distinct(matches, &[sgi::S_FROM])?);
        let loop_rows = scratch.track(sgi::edge_rows(backend, matches, sgi::S_FROM, &edge.catenated_name())?);
        let objects = scratch.track(sgi::keep_subgraphs(backend, current.objects, kept, sgi::S_FROM)?);
        let old_links = scratch.track(sgi::keep_subgraphs(backend, current.links, kept, sgi::S_FROM)?);
        let links = scratch.track(backend.union(&[old_links, loop_rows])?);
        debug!(
            output = %input.effect.output,
            subgraphs = backend.row_count(kept)?,
            "absorb_self_loop.generated"
        );
        let tables = SubgraphTables {
            objects: scratch.keep(objects),
            links: scratch.keep(links),
        };
        ctx.registry.replace(&input.effect.output, tables)?;
        Ok(Some(input.effect.output.clone()))
    }
}
