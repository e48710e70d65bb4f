use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{ItemId, Query};
use crate::profile::{profile_timer, record, record_timer, ProfileEvent, ProfileTimer};
use crate::strategy::{default_strategies, Application, EffectRecord, Strategy};

use super::graph::{StateEdge, StateId, TransformationGraph};
use super::path::{shortest_path, Path};

/// Search settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Expand every reachable state before choosing a path instead of
    /// stopping at the first consolidated state.
    pub exhaustive: bool,
    /// Give up once the graph holds more states than this.
    pub max_states: Option<usize>,
}

/// How the search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// A consolidated state was reached.
    Solved,
    /// Every reachable state was expanded without reaching a goal.
    Exhausted,
    /// The state cap was hit.
    Capped,
}

/// Finds a rewrite sequence that consolidates a query.
#[derive(Clone, Debug)]
pub struct Planner {
    strategies: Vec<Arc<dyn Strategy>>,
    config: PlannerConfig,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl Planner {
    /// Planner over the built-in strategies.
    pub fn new(config: PlannerConfig) -> Self {
        Self::with_strategies(default_strategies(), config)
    }

    /// Planner over a custom strategy set, tried in the given order.
    pub fn with_strategies(strategies: Vec<Arc<dyn Strategy>>, config: PlannerConfig) -> Self {
        Self { strategies, config }
    }

    /// Strategies in the order they are tried.
    pub fn strategies(&self) -> &[Arc<dyn Strategy>] {
        &self.strategies
    }

    /// Active settings.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Builds the search graph for `query` and picks the shortest path.
    ///
    /// Failing to consolidate the query is not an error: the returned plan
    /// simply has no path. Errors come from strategies and from a rewrite
    /// that leads back to one of its own ancestors.
    pub fn plan(&self, query: &Query) -> Result<Plan> {
        let timer = profile_timer();
        let mut search = Search {
            planner: self,
            graph: TransformationGraph::new(query.clone()),
        };
        let outcome = search.expand(StateId::START)?;
        let graph = search.graph;
        let path = match outcome {
            SearchOutcome::Capped => None,
            SearchOutcome::Solved | SearchOutcome::Exhausted => shortest_path(&graph, StateId::START),
        };
        record_timer(ProfileTimer::Plan, timer);
        info!(
            query = query.name(),
            states = graph.num_states(),
            edges = graph.num_edges(),
            shared = graph.num_shared_targets(),
            outcome = ?outcome,
            steps = path.as_ref().map(Path::len),
            "planner.finished"
        );
        let plan = Plan { graph, path, outcome };
        if let Some(path) = plan.path() {
            debug!(path = %plan.describe_path(path), "planner.path");
        }
        Ok(plan)
    }
}

struct Search<'p> {
    planner: &'p Planner,
    graph: TransformationGraph,
}

impl Search<'_> {
    fn expand(&mut self, state: StateId) -> Result<SearchOutcome> {
        let query = match self.graph.state(state) {
            Some(vertex) if vertex.is_consolidated() => return Ok(SearchOutcome::Solved),
            Some(vertex) => vertex.query().clone(),
            None => return Err(Error::invariant(format!("state {state} is not part of the search graph"))),
        };
        debug!(%state, query = %query, "planner.expand");

        let planner = self.planner;
        let mut outcome = SearchOutcome::Exhausted;
        for vertex in query.vertices(true) {
            for strategy in &planner.strategies {
                for application in strategy.applications(&query, vertex)? {
                    record(ProfileEvent::Application);
                    let (next, effect) = strategy.apply(&query, &application)?.into_parts()?;
                    let Some(target) = self.add_rewrite(state, vertex, strategy, application, next, effect)? else {
                        continue;
                    };
                    if planner
                        .config
                        .max_states
                        .is_some_and(|max| self.graph.num_states() > max)
                    {
                        return Ok(SearchOutcome::Capped);
                    }
                    match self.expand(target)? {
                        SearchOutcome::Solved if !planner.config.exhaustive => {
                            return Ok(SearchOutcome::Solved);
                        }
                        SearchOutcome::Solved => outcome = SearchOutcome::Solved,
                        SearchOutcome::Capped => return Ok(SearchOutcome::Capped),
                        SearchOutcome::Exhausted => {}
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Records one rewrite. Returns the target when it is a new state that
    /// still needs expanding.
    fn add_rewrite(
        &mut self,
        state: StateId,
        vertex: ItemId,
        strategy: &Arc<dyn Strategy>,
        application: Application,
        next: Query,
        effect: EffectRecord,
    ) -> Result<Option<StateId>> {
        if let Some(existing) = self.graph.find(&next) {
            if self.graph.reaches(existing, state) {
                return Err(Error::invariant(format!(
                    "rewrite {}:{} from {state} leads back to ancestor {existing}",
                    strategy.name(),
                    application.arg_string()
                )));
            }
            debug!(from = %state, to = %existing, strategy = strategy.name(), "planner.dedup");
            record(ProfileEvent::DedupHit);
            self.graph
                .add_edge(state, existing, vertex, Arc::clone(strategy), application, effect);
            return Ok(None);
        }
        let target = self.graph.add_state(next);
        record(ProfileEvent::StateCreated);
        self.graph
            .add_edge(state, target, vertex, Arc::clone(strategy), application, effect);
        Ok(Some(target))
    }
}

/// Search graph plus the chosen path, if any.
#[derive(Debug)]
pub struct Plan {
    graph: TransformationGraph,
    path: Option<Path>,
    outcome: SearchOutcome,
}

/// One step of a chosen path.
#[derive(Clone, Copy, Debug)]
pub struct PlanStep<'p> {
    /// Zero-based position in the path.
    pub index: usize,
    /// Query the step's rewrite was computed on.
    pub before: &'p Query,
    /// Rewrite to replay.
    pub edge: &'p StateEdge,
}

/// Serializable overview of a plan.
#[derive(Clone, Debug, Serialize)]
pub struct PlanSummary {
    /// Query name.
    pub query: String,
    /// How the search ended.
    pub outcome: SearchOutcome,
    /// States in the search graph.
    pub states: usize,
    /// Rewrites in the search graph.
    pub edges: usize,
    /// Rewrites that reached an already known state.
    pub shared_targets: usize,
    /// Chosen steps; empty without a solution.
    pub steps: Vec<StepSummary>,
}

/// One chosen step.
#[derive(Clone, Debug, Serialize)]
pub struct StepSummary {
    /// Strategy name.
    pub strategy: String,
    /// Application arguments (`A|Y|B`).
    pub args: String,
    /// Composite produced.
    pub output: String,
}

impl Plan {
    /// Query the plan was computed for.
    pub fn query(&self) -> &Query {
        self.graph.start()
    }

    /// Full search graph.
    pub fn graph(&self) -> &TransformationGraph {
        &self.graph
    }

    /// Chosen path; `None` when no consolidated state was reached.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    /// How the search ended.
    pub fn outcome(&self) -> SearchOutcome {
        self.outcome
    }

    /// Whether a path was found.
    pub fn is_solved(&self) -> bool {
        self.path.is_some()
    }

    /// Steps of the chosen path; empty without one.
    pub fn steps(&self) -> Vec<PlanStep<'_>> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        path.edges()
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                let edge = self.graph.edge(*id)?;
                let before = self.graph.state(edge.from())?.query();
                Some(PlanStep { index, before, edge })
            })
            .collect()
    }

    /// Consolidated query at the end of the path.
    pub fn final_query(&self) -> Option<&Query> {
        let path = self.path.as_ref()?;
        let last = match path.edges().last() {
            Some(id) => self.graph.edge(*id)?.to(),
            None => StateId::START,
        };
        Some(self.graph.state(last)?.query())
    }

    /// Serializable overview.
    pub fn explain(&self) -> PlanSummary {
        PlanSummary {
            query: self.query().name().to_owned(),
            outcome: self.outcome,
            states: self.graph.num_states(),
            edges: self.graph.num_edges(),
            shared_targets: self.graph.num_shared_targets(),
            steps: self
                .steps()
                .iter()
                .map(|step| StepSummary {
                    strategy: step.edge.strategy().name().to_owned(),
                    args: step.edge.application().arg_string(),
                    output: step.edge.effect().output.clone(),
                })
                .collect(),
        }
    }

    fn describe_path(&self, path: &Path) -> String {
        path.edges()
            .iter()
            .filter_map(|id| self.graph.edge(*id))
            .map(StateEdge::describe)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
