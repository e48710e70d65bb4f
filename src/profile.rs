use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;

/// A snapshot of planner and executor profiling counters.
///
/// Profiling is enabled via the `QGRAPH_PROFILE` environment variable. When it
/// is unset every recording call is a no-op and the snapshot stays zeroed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileSnapshot {
    /// Search states created by the planner.
    pub states_created: u64,
    /// Rewrites whose result matched an existing state.
    pub dedup_hits: u64,
    /// Strategy applications evaluated.
    pub applications: u64,
    /// Total nanoseconds spent planning.
    pub plan_ns: u64,
    /// Plan steps executed against the backend.
    pub steps_executed: u64,
    /// Total nanoseconds spent executing steps.
    pub step_ns: u64,
}

#[derive(Default)]
struct ProfileCounters {
    states_created: AtomicU64,
    dedup_hits: AtomicU64,
    applications: AtomicU64,
    plan_ns: AtomicU64,
    steps_executed: AtomicU64,
    step_ns: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<ProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("QGRAPH_PROFILE").is_some())
}

fn counters() -> Option<&'static ProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(ProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum ProfileEvent {
    StateCreated,
    DedupHit,
    Application,
}

pub(crate) fn record(event: ProfileEvent) {
    let Some(counters) = counters() else {
        return;
    };
    let counter = match event {
        ProfileEvent::StateCreated => &counters.states_created,
        ProfileEvent::DedupHit => &counters.dedup_hits,
        ProfileEvent::Application => &counters.applications,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) enum ProfileTimer {
    Plan,
    Step,
}

pub(crate) fn record_timer(kind: ProfileTimer, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    match kind {
        ProfileTimer::Plan => {
            counters.plan_ns.fetch_add(nanos, Ordering::Relaxed);
        }
        ProfileTimer::Step => {
            counters.step_ns.fetch_add(nanos, Ordering::Relaxed);
            counters.steps_executed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Returns the current counters, or `None` when profiling is disabled.
pub fn profile_snapshot(reset: bool) -> Option<ProfileSnapshot> {
    let counters = counters()?;
    let read = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(ProfileSnapshot {
        states_created: read(&counters.states_created),
        dedup_hits: read(&counters.dedup_hits),
        applications: read(&counters.applications),
        plan_ns: read(&counters.plan_ns),
        steps_executed: read(&counters.steps_executed),
        step_ns: read(&counters.step_ns),
    })
}
