use crate::error::{Error, Result};
use crate::model::{ItemId, Query};

use super::{Application, RewriteEffect, StepContext, StepInput, Strategy};

/// Lifts a composite vertex that is alone in its subquery into the parent,
/// handing it the subquery's annotation. No backend work.
#[derive(Clone, Copy, Debug, Default)]
pub struct EliminateSubquery;

impl Strategy for EliminateSubquery {
    fn name(&self) -> &'static str {
        "eliminate-subquery"
    }

    fn description(&self) -> &'static str {
        "eliminate subquery holding a single consolidated vertex"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>> {
        let item = query.item(vertex)?;
        if !item.is_composite() || item.is_annotated() || item.is_marked() {
            return Ok(Vec::new());
        }
        let Some(owner) = item.container() else {
            return Ok(Vec::new());
        };
        let container = query.container(owner)?;
        let alone = container.is_subquery()
            && container.vertices() == [vertex]
            && container.edges().is_empty()
            && container.subqueries().is_empty()
            && container.constraints().is_empty();
        if !alone {
            return Ok(Vec::new());
        }
        Ok(vec![Application::new(query, &[vertex])?])
    }

    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect> {
        let vertex = application.item(0)?;
        let mut copy = query.clone();
        let owner = copy
            .item(vertex)?
            .container()
            .ok_or_else(|| Error::invalid_state("vertex has no owning container"))?;
        let annotation = copy.container(owner)?.annotation();
        copy.flatten_subquery(owner)?;
        copy.item_mut(vertex)?.set_annotation(annotation);
        Ok(RewriteEffect { query: copy, output: vertex })
    }

    fn generate(&self, _input: &StepInput<'_>, _ctx: &mut StepContext<'_, '_>) -> Result<Option<String>> {
        Ok(None)
    }
}
