use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{Backend, ContainerStore, TableEngine};
use crate::error::{Error, Result};
use crate::plan::{Plan, PlanStep};
use crate::profile::{profile_timer, record_timer, ProfileTimer};
use crate::strategy::{sgi, StepContext, StepInput};

use super::{links, ScratchTables, TempTableRegistry};

/// Execution settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Delete an existing destination container instead of failing.
    pub replace_existing: bool,
    /// Commit the backend after every executed step.
    pub commit_each_step: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            replace_existing: false,
            commit_each_step: true,
        }
    }
}

/// Summary of one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Destination container.
    pub container: String,
    /// Steps whose backend work ran.
    pub steps_executed: usize,
    /// Steps served from cached results or not needed for the result.
    pub steps_skipped: usize,
    /// Object rows in the result.
    pub objects: usize,
    /// Link rows in the result.
    pub links: usize,
    /// Matching subgraphs found.
    pub subgraphs: usize,
    /// Links created by derived-link requests.
    pub derived_links: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum StepMode {
    Skip,
    Fetch(String),
    Execute,
}

/// Replays a plan's steps against a backend.
pub struct Executor<'e> {
    backend: &'e dyn Backend,
    config: ExecutorConfig,
}

impl<'e> Executor<'e> {
    /// Executor over `backend`.
    pub fn new(backend: &'e dyn Backend, config: ExecutorConfig) -> Self {
        Self { backend, config }
    }

    /// Active settings.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs `plan` and stores every matching subgraph in a new container
    /// named `destination`, then creates the query's derived links.
    ///
    /// The destination is only created once every step succeeded; temporary
    /// tables are released on every exit path.
    pub fn execute(&self, plan: &Plan, destination: &str) -> Result<ExecutionReport> {
        let backend = self.backend;
        if !plan.is_solved() {
            return Err(Error::invalid_state(format!(
                "query '{}' has no execution plan",
                plan.query().name()
            )));
        }
        let steps = plan.steps();
        let Some(last) = steps.last() else {
            return Err(Error::invalid_state(format!(
                "plan for '{}' has no steps to execute",
                plan.query().name()
            )));
        };
        let final_name = last.edge.effect().output.clone();

        if backend.has_child(destination)? {
            if !self.config.replace_existing {
                return Err(Error::invalid_state(format!(
                    "destination container '{destination}' already exists"
                )));
            }
            warn!(container = destination, "executor.replace_existing");
            backend.delete_child(destination)?;
        }

        let cached = plan.query().cached_items(true);
        let modes = step_modes(&steps, &final_name, &cached);
        let total = steps.len();
        let mut registry = TempTableRegistry::new(backend);
        let mut reused = BTreeSet::new();
        let (mut executed, mut skipped) = (0, 0);

        for (step, mode) in steps.iter().zip(&modes) {
            let label = format!("{}/{total} {}", step.index + 1, step.edge.describe());
            let output = &step.edge.effect().output;
            match mode {
                StepMode::Skip => {
                    debug!(step = %label, "executor.skip");
                    skipped += 1;
                }
                StepMode::Fetch(source) => {
                    info!(step = %label, source = %source, "executor.fetching");
                    let tables = sgi::cached_tables(backend, source, &step.edge.effect().names)
                        .map_err(|err| err.in_step(&label))?;
                    registry.replace(output, tables)?;
                    reused.insert(output.clone());
                    skipped += 1;
                }
                StepMode::Execute => {
                    info!(step = %label, "executor.executing");
                    let timer = profile_timer();
                    let input = StepInput {
                        before: step.before,
                        application: step.edge.application(),
                        effect: step.edge.effect(),
                    };
                    let mut ctx = StepContext {
                        backend,
                        registry: &mut registry,
                    };
                    let written = step
                        .edge
                        .strategy()
                        .generate(&input, &mut ctx)
                        .map_err(|err| err.in_step(&label))?;
                    if self.config.commit_each_step {
                        backend
                            .commit()
                            .map_err(|err| Error::from(err).in_step(&label))?;
                    }
                    record_timer(ProfileTimer::Step, timer);
                    if let Some(tables) = written.as_deref().and_then(|name| registry.get(name)) {
                        debug!(
                            step = %label,
                            objects = backend.row_count(tables.objects)?,
                            links = backend.row_count(tables.links)?,
                            "executor.step"
                        );
                    }
                    executed += 1;
                }
            }
        }

        for name in &reused {
            if name != &final_name && registry.contains(name) {
                registry.release(name)?;
            }
        }
        if registry.len() != 1 || !registry.contains(&final_name) {
            return Err(Error::invariant(format!(
                "expected only '{final_name}' to remain after the last step, found {:?}",
                registry.names()
            )));
        }

        let tables = registry.take(&final_name)?;
        let mut scratch = ScratchTables::new(backend);
        scratch.track_pair(tables);
        let objects = backend.row_count(tables.objects)?;
        let links = backend.row_count(tables.links)?;
        backend.create_child_from_temp_tables(destination, tables.objects, tables.links)?;
        if let Err(err) = backend.commit() {
            if let Err(cleanup) = backend.delete_child(destination) {
                warn!(container = destination, error = %cleanup, "executor.cleanup_failed");
            }
            return Err(err.into());
        }
        drop(scratch);
        let subgraphs = backend.subgraph_count(destination)?;
        info!(container = destination, subgraphs, objects, links, "executor.stored");

        let specs = plan.query().derived_links(true);
        let derived_links = links::materialize(backend, destination, &specs)?;
        Ok(ExecutionReport {
            container: destination.to_owned(),
            steps_executed: executed,
            steps_skipped: skipped,
            objects,
            links,
            subgraphs,
            derived_links,
        })
    }
}

/// Decides, walking back from the final step, which steps must run.
///
/// A step is needed when a later needed step consumes its output. A needed
/// step whose output names all sit in one cached container is fetched
/// instead of run, and the steps feeding it are no longer needed.
fn step_modes(steps: &[PlanStep<'_>], final_name: &str, cached: &BTreeMap<String, String>) -> Vec<StepMode> {
    let mut needed = BTreeSet::from([final_name.to_owned()]);
    let mut modes = vec![StepMode::Skip; steps.len()];
    for (step, mode) in steps.iter().zip(modes.iter_mut()).rev() {
        let effect = step.edge.effect();
        if !needed.remove(&effect.output) {
            continue;
        }
        if let Some(source) = common_source(&effect.names, cached) {
            *mode = StepMode::Fetch(source.to_owned());
            continue;
        }
        *mode = StepMode::Execute;
        needed.extend(step.edge.application().names().iter().cloned());
    }
    modes
}

fn common_source<'c>(names: &[String], cached: &'c BTreeMap<String, String>) -> Option<&'c str> {
    let (first, rest) = names.split_first()?;
    let source = cached.get(first)?;
    rest.iter()
        .all(|name| cached.get(name) == Some(source))
        .then_some(source.as_str())
}
