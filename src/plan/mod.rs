//! Transformation-graph planner.
//!
//! The planner explores query states reachable through rewrite strategies,
//! depth first, merging states with equal content. The search stops at the
//! first consolidated state unless [`PlannerConfig::exhaustive`] is set; the
//! chosen [`Path`] is then the shortest route from the start state to any
//! consolidated state in the graph built so far.

mod graph;
mod path;
mod planner;

pub use graph::{EdgeId, StateEdge, StateId, StateVertex, TransformationGraph};
pub use path::{shortest_path, Path};
pub use planner::{Plan, PlanStep, PlanSummary, Planner, PlannerConfig, SearchOutcome, StepSummary};
