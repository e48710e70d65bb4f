//! One query-compilation session: validate, plan, execute.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::exec::{ExecutionReport, Executor};
use crate::model::{Query, QueryDescription};
use crate::plan::{Plan, PlanSummary, Planner};
use crate::validate::{validate, ValidationError};

/// Reported when the planner finds no consolidating rewrite sequence.
pub const NO_SOLUTION_MESSAGE: &str = "no solution found with current rewrite strategies";

/// Result of compiling a query.
#[derive(Debug)]
pub enum CompileOutcome {
    /// Validation passed and a plan was found.
    Compiled(Plan),
    /// The query was rejected before planning.
    Invalid(ValidationError),
    /// The query is valid but the strategies cannot consolidate it.
    NoSolution(Plan),
}

impl CompileOutcome {
    /// The plan, when one was found.
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            CompileOutcome::Compiled(plan) => Some(plan),
            _ => None,
        }
    }

    /// Whether a plan was found.
    pub fn is_compiled(&self) -> bool {
        matches!(self, CompileOutcome::Compiled(_))
    }
}

/// Result of running a query.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step ran and the result container was created.
    Completed {
        /// Chosen plan.
        plan: PlanSummary,
        /// Execution counts.
        report: ExecutionReport,
    },
    /// The query was rejected before planning.
    Invalid {
        /// Every violation, in detection order.
        violations: Vec<String>,
    },
    /// No plan exists; nothing was executed.
    NoSolution {
        /// Search statistics.
        plan: PlanSummary,
    },
}

/// Compiles and runs queries with one engine configuration.
#[derive(Clone, Debug)]
pub struct QuerySession {
    config: EngineConfig,
    planner: Planner,
}

impl Default for QuerySession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl QuerySession {
    /// Session with the built-in strategies.
    pub fn new(config: EngineConfig) -> Self {
        let planner = Planner::new(config.planner.clone());
        Self { config, planner }
    }

    /// Session with a custom planner; `config.planner` is ignored.
    pub fn with_planner(config: EngineConfig, planner: Planner) -> Self {
        Self { config, planner }
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Planner in use.
    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Reads and builds a query from a JSON description file.
    pub fn load_query(path: &Path) -> Result<Query> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::invalid_argument(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::parse_query(&text)
    }

    /// Builds a query from JSON description text.
    pub fn parse_query(text: &str) -> Result<Query> {
        let description = QueryDescription::from_json(text)
            .map_err(|err| Error::invalid_argument(format!("malformed query description: {err}")))?;
        description.build()
    }

    /// Validates and plans `query`.
    pub fn compile(&self, query: &Query) -> Result<CompileOutcome> {
        if let Err(err) = validate(query) {
            warn!(
                query = query.name(),
                violations = err.violations().len(),
                "session.invalid"
            );
            return Ok(CompileOutcome::Invalid(err));
        }
        let plan = self.planner.plan(query)?;
        if !plan.is_solved() {
            warn!(query = query.name(), outcome = ?plan.outcome(), "session.no_solution");
            return Ok(CompileOutcome::NoSolution(plan));
        }
        Ok(CompileOutcome::Compiled(plan))
    }

    /// Compiles `query` and, when a plan exists, stores its matches in a new
    /// container `destination` of `backend`.
    pub fn run(&self, query: &Query, backend: &dyn Backend, destination: &str) -> Result<RunOutcome> {
        let plan = match self.compile(query)? {
            CompileOutcome::Compiled(plan) => plan,
            CompileOutcome::Invalid(err) => {
                return Ok(RunOutcome::Invalid {
                    violations: err.violations().to_vec(),
                })
            }
            CompileOutcome::NoSolution(plan) => {
                return Ok(RunOutcome::NoSolution {
                    plan: plan.explain(),
                })
            }
        };
        let report = Executor::new(backend, self.config.executor.clone()).execute(&plan, destination)?;
        info!(
            query = query.name(),
            container = destination,
            subgraphs = report.subgraphs,
            "session.completed"
        );
        Ok(RunOutcome::Completed {
            plan: plan.explain(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::model::{Annotation, Item};

    const PAIR: &str = r#"{
        "name": "pair",
        "vertices": [
            {"name": "A", "condition": {"test": {"operator": "eq", "attribute": "kind", "value": "a"}}},
            {"name": "B", "condition": {"test": {"operator": "eq", "attribute": "kind", "value": "b"}}}
        ],
        "edges": [{"name": "Y", "from": "A", "to": "B", "directed": true}]
    }"#;

    fn pair() -> Query {
        let mut q = Query::new("pair", "");
        let root = q.root();
        q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
        q.add_vertex(root, Item::vertex("B").unwrap()).unwrap();
        q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap()).unwrap();
        q
    }

    #[test]
    fn invalid_queries_are_not_planned() {
        let mut q = pair();
        let root = q.root();
        q.add_vertex(root, Item::vertex("C").unwrap()).unwrap();
        let outcome = QuerySession::default().compile(&q).unwrap();
        match outcome {
            CompileOutcome::Invalid(err) => assert!(!err.violations().is_empty()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn unsolvable_queries_report_no_solution() {
        let mut q = pair();
        let root = q.root();
        q.add_vertex(root, Item::vertex("C").unwrap().with_annotation(Annotation::at_least(1)))
            .unwrap();
        for (name, from) in [("Z", "B"), ("W", "A")] {
            let edge = Item::edge(name, from, "C", true)
                .unwrap()
                .with_annotation(Annotation::at_least(1));
            q.add_edge(root, edge).unwrap();
        }
        let backend = MemoryBackend::new();
        let outcome = QuerySession::default().run(&q, &backend, "out").unwrap();
        assert!(matches!(outcome, RunOutcome::NoSolution { .. }));
        assert!(backend.container("out").is_none());
    }

    #[test]
    fn run_stores_matches() {
        let backend = MemoryBackend::new();
        backend.add_object(1, [("kind", "a")]);
        backend.add_object(2, [("kind", "b")]);
        backend.add_link(10, 1, 2, [("type", "x")]);
        let query = QuerySession::parse_query(PAIR).unwrap();
        let session = QuerySession::default();
        assert!(session.compile(&query).unwrap().is_compiled());
        match session.run(&query, &backend, "out").unwrap() {
            RunOutcome::Completed { report, plan } => {
                assert_eq!(report.subgraphs, 1);
                assert_eq!(plan.steps.len(), 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn malformed_descriptions_are_rejected() {
        let err = QuerySession::parse_query("{").unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }
}
