//! Rewrite strategies.
//!
//! A [`Strategy`] recognises a pattern shape around one vertex
//! ([`Strategy::applications`]), rewrites a private copy of the query
//! ([`Strategy::apply`]), and later replays the same rewrite against the
//! backend ([`Strategy::generate`]). The planner only needs the first two;
//! the executor only needs the third.

mod annotated_vertex;
mod collapse_edge;
mod constraint;
mod get_vertex;
mod self_loop;
pub(crate) mod sgi;
mod subquery;
mod upper_limit;

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::backend::Backend;
use crate::error::Result;
use crate::exec::TempTableRegistry;
use crate::model::{Constraint, ItemId, Query};

pub use annotated_vertex::AbsorbAnnotatedVertex;
pub use collapse_edge::CollapseEdge;
pub use constraint::ProcessConstraint;
pub use get_vertex::GetVertex;
pub use self_loop::AbsorbSelfLoop;
pub use subquery::EliminateSubquery;
pub use upper_limit::ApplyUpperLimit;

/// One way a strategy can rewrite the query around a vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct Application {
    items: SmallVec<[ItemId; 3]>,
    names: SmallVec<[String; 3]>,
    constraint: Option<Constraint>,
}

impl Application {
    /// Application over `items` of `query`, recording their catenated names.
    pub fn new(query: &Query, items: &[ItemId]) -> Result<Self> {
        let mut names = SmallVec::new();
        for id in items {
            names.push(query.item(*id)?.catenated_name());
        }
        Ok(Self {
            items: items.iter().copied().collect(),
            names,
            constraint: None,
        })
    }

    /// Builder: attach the constraint the application resolves.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Items in the query the application was computed on.
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    /// Item at `index`; strategies index their own applications.
    pub fn item(&self, index: usize) -> Result<ItemId> {
        self.items.get(index).copied().ok_or_else(|| {
            crate::error::Error::invalid_argument(format!(
                "application {} has no item #{index}",
                self.arg_string()
            ))
        })
    }

    /// Catenated names of [`Application::items`].
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Constraint the application resolves, if any.
    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    /// `A|Y|B`, plus the constraint when present.
    pub fn arg_string(&self) -> String {
        let joined = self.names.join("|");
        match &self.constraint {
            Some(constraint) => format!("{joined}|{constraint}"),
            None => joined,
        }
    }
}

/// A rewritten copy of the query and the vertex that now stands for the
/// rewritten region.
#[derive(Clone, Debug)]
pub struct RewriteEffect {
    /// Rewritten query.
    pub query: Query,
    /// Output vertex, as an id of [`RewriteEffect::query`].
    pub output: ItemId,
}

impl RewriteEffect {
    /// Splits the effect into the new query and an id-free record.
    pub fn into_parts(self) -> Result<(Query, EffectRecord)> {
        let item = self.query.item(self.output)?;
        let record = EffectRecord {
            output: item.catenated_name(),
            names: item.names().to_vec(),
        };
        Ok((self.query, record))
    }
}

/// What a rewrite produced, kept on each search-graph edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectRecord {
    /// Catenated name of the output vertex.
    pub output: String,
    /// Individual names of the output vertex.
    pub names: Vec<String>,
}

/// Everything a strategy sees when replaying a rewrite.
#[derive(Clone, Copy, Debug)]
pub struct StepInput<'a> {
    /// Query the application was computed on.
    pub before: &'a Query,
    /// Application being replayed.
    pub application: &'a Application,
    /// Result recorded when the rewrite was applied.
    pub effect: &'a EffectRecord,
}

/// Backend and intermediate tables available to a step.
pub struct StepContext<'r, 'e> {
    /// Source data and table engine.
    pub backend: &'e dyn Backend,
    /// Intermediate tables keyed by composite name.
    pub registry: &'r mut TempTableRegistry<'e>,
}

/// A pluggable graph rewrite.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Short kebab-case name used in plans and logs.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str;

    /// Every way the strategy applies at `vertex`. Empty when it does not.
    fn applications(&self, query: &Query, vertex: ItemId) -> Result<Vec<Application>>;

    /// Rewrites a copy of `query`; `query` itself is left untouched.
    fn apply(&self, query: &Query, application: &Application) -> Result<RewriteEffect>;

    /// Performs the backend work. Returns the registry name written, or
    /// `None` when the step needs no backend work.
    fn generate(&self, input: &StepInput<'_>, ctx: &mut StepContext<'_, '_>) -> Result<Option<String>>;
}

/// Built-in strategies in the order the planner tries them.
pub fn default_strategies() -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(GetVertex),
        Arc::new(AbsorbSelfLoop),
        Arc::new(CollapseEdge),
        Arc::new(AbsorbAnnotatedVertex),
        Arc::new(ApplyUpperLimit),
        Arc::new(EliminateSubquery),
        Arc::new(ProcessConstraint),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;

    #[test]
    fn default_order_is_stable() {
        let names: Vec<&str> = default_strategies().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "get-vertex",
                "absorb-self-loop",
                "collapse-edge",
                "absorb-annotated-vertex",
                "apply-upper-limit",
                "eliminate-subquery",
                "process-constraint"
            ]
        );
    }

    #[test]
    fn arg_string_joins_names() {
        let mut q = Query::new("args", "");
        let root = q.root();
        let a = q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
        let b = q.add_vertex(root, Item::vertex("B").unwrap()).unwrap();
        let y = q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap()).unwrap();
        let app = Application::new(&q, &[a, y, b]).unwrap();
        assert_eq!(app.arg_string(), "A|Y|B");
        assert_eq!(app.item(1).unwrap(), y);
        assert!(app.item(3).is_err());
    }
}
