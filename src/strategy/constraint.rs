use tracing::debug;

use crate::backend::{
    Backend, JoinColumn, RowFilter, SourceKind, SourceScope, TableEngine, TableId, ATTR_ID,
    ATTR_VALUE, ITEM_ID, SUBG_ID,
};
use crate::error::{Error, Result};
use crate::exec::{ScratchTables, SubgraphTables};
use crate::model::{CompareOp, ConstraintSide, ItemId, Query};

use super::{sgi, Application, RewriteEffect, StepContext, StepInput, Strategy};

const LEFT_VALUE: &str = "v1";
const RIGHT_VALUE: &str = "v2";

/// Filters a composite vertex's subgraphs by a constraint whose items it
/// already holds, then drops the constraint.
///
/// A subgraph survives when some instance of the left item and some instance
/// of the right item satisfy the operator. A literal operand is compared with
/// every instance of the other side.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessConstraint;

impl Strategy for ProcessConstraint {
    fn name(&self) -> &'static str {
        "process-constraint"
    }

    fn description(&self) -> &'static str {
        "apply constraint inside consolidated vertex"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>> {
        let item = query.item(vertex)?;
        if !item.is_composite() || item.is_annotated() || item.is_marked() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for constraint in query.constraints(true) {
            if constraint.annotation().is_some() {
                continue;
            }
            if constraint.item_names().iter().all(|name| item.has_name(name)) {
                out.push(Application::new(query, &[vertex])?.with_constraint(constraint.clone()));
            }
        }
        Ok(out)
    }

    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect> {
        let vertex = application.item(0)?;
        let constraint = application
            .constraint()
            .ok_or_else(|| Error::invalid_argument("application carries no constraint"))?;
        let mut copy = query.clone();
        copy.remove_constraint(constraint)?;
        Ok(RewriteEffect { query: copy, output: vertex })
    }

    fn generate(&self, input: &StepInput<'_>, ctx: &mut StepContext<'_, '_>) -> Result<Option<String>> {
        let constraint = input
            .application
            .constraint()
            .ok_or_else(|| Error::invalid_argument("application carries no constraint"))?;
        let op = CompareOp::parse(constraint.operator())
            .filter(CompareOp::is_binary)
            .ok_or_else(|| {
                Error::invalid_state(format!(
                    "constraint operator '{}' cannot relate two operands",
                    constraint.operator()
                ))
            })?;

        let backend = ctx.backend;
        let mut scratch = ScratchTables::new(backend);
        let current = ctx.registry.require(&input.effect.output)?;
        let (rows, kind) = if constraint.on_edges() {
            (current.links, SourceKind::Link)
        } else {
            (current.objects, SourceKind::Object)
        };
        let holding = match (constraint.left(), constraint.right()) {
            (side, ConstraintSide::Literal(value)) => {
                let values = side_values(backend, &mut scratch, rows, kind, side, LEFT_VALUE)?;
                let filter = RowFilter::column_value(LEFT_VALUE, op, value.clone());
                scratch.track(backend.filter(values, &filter)?)
            }
            (ConstraintSide::Literal(value), side) => {
                let values = side_values(backend, &mut scratch, rows, kind, side, RIGHT_VALUE)?;
                let filter = RowFilter::column_value(RIGHT_VALUE, op.swapped(), value.clone());
                scratch.track(backend.filter(values, &filter)?)
            }
            (left, right) => {
                let left = side_values(backend, &mut scratch, rows, kind, left, LEFT_VALUE)?;
                let right = side_values(backend, &mut scratch, rows, kind, right, RIGHT_VALUE)?;
                let paired = scratch.track(backend.join(
                    left,
                    right,
                    &[(SUBG_ID, SUBG_ID)],
                    &[
                        JoinColumn::left(SUBG_ID, SUBG_ID),
                        JoinColumn::left(LEFT_VALUE, LEFT_VALUE),
                        JoinColumn::right(RIGHT_VALUE, RIGHT_VALUE),
                    ],
                )?);
                scratch.track(backend.filter(paired, &RowFilter::columns(LEFT_VALUE, op, RIGHT_VALUE))?)
            }
        };
        let kept = scratch.track(backend.distinct(holding, &[SUBG_ID])?);
        let objects = scratch.track(sgi::keep_subgraphs(backend, current.objects, kept, SUBG_ID)?);
        let links = scratch.track(sgi::keep_subgraphs(backend, current.links, kept, SUBG_ID)?);
        debug!(
            output = %input.effect.output,
            constraint = %constraint,
            subgraphs = backend.row_count(kept)?,
            "process_constraint.generated"
        );
        let tables = SubgraphTables {
            objects: scratch.keep(objects),
            links: scratch.keep(links),
        };
        ctx.registry.replace(&input.effect.output, tables)?;
        Ok(Some(input.effect.output.clone()))
    }
}

/// `subg_id, <alias>` for one operand: the item's id, or the value of the
/// named attribute when it has one.
fn side_values(
    backend: &dyn Backend,
    scratch: &mut ScratchTables<'_>,
    rows: TableId,
    kind: SourceKind,
    side: &ConstraintSide,
    alias: &str,
) -> Result<TableId> {
    let item = side
        .item_name()
        .ok_or_else(|| Error::invalid_state(format!("operand {side} names no item")))?;
    let named = sgi::named_rows(backend, scratch, rows, item)?;
    let Some(attribute) = side.attribute_name() else {
        let ids = scratch.track(backend.distinct(named, &[SUBG_ID, ITEM_ID])?);
        backend.rename_column(ids, ITEM_ID, alias)?;
        return Ok(ids);
    };
    let values = scratch.track(backend.attribute_values(kind, attribute)?);
    Ok(scratch.track(backend.join(
        named,
        values,
        &[(ITEM_ID, ATTR_ID)],
        &[JoinColumn::left(SUBG_ID, SUBG_ID), JoinColumn::right(ATTR_VALUE, alias)],
    )?))
}
