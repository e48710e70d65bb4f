use super::graph::{EdgeId, StateId, TransformationGraph};

/// Rewrites leading from the start state to a consolidated state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    edges: Vec<EdgeId>,
}

impl Path {
    /// Edges in execution order.
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Number of rewrites.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the start state was already consolidated.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Distance {
    Unvisited,
    InProgress,
    Unreachable,
    Steps(usize),
}

/// Fewest-edge path from `start` to any consolidated state.
///
/// Among equally short paths the one that comes first in discovery order
/// wins: at every state the earliest outgoing edge on a shortest route is
/// taken.
pub fn shortest_path(graph: &TransformationGraph, start: StateId) -> Option<Path> {
    let mut memo = vec![Distance::Unvisited; graph.num_states()];
    let Distance::Steps(_) = distance(graph, start, &mut memo) else {
        return None;
    };

    let mut edges = Vec::new();
    let mut current = start;
    loop {
        let state = graph.state(current)?;
        if state.is_consolidated() {
            return Some(Path { edges });
        }
        let Distance::Steps(remaining) = memo[current.0 as usize] else {
            return None;
        };
        let next = state.out().iter().copied().find(|id| {
            graph
                .edge(*id)
                .is_some_and(|e| matches!(memo[e.to().0 as usize], Distance::Steps(d) if d + 1 == remaining))
        })?;
        edges.push(next);
        current = graph.edge(next)?.to();
    }
}

fn distance(graph: &TransformationGraph, id: StateId, memo: &mut [Distance]) -> Distance {
    let slot = id.0 as usize;
    match memo.get(slot) {
        Some(Distance::Unvisited) => {}
        Some(Distance::InProgress) | None => return Distance::Unreachable,
        Some(known) => return *known,
    }
    let Some(state) = graph.state(id) else {
        return Distance::Unreachable;
    };
    if state.is_consolidated() {
        memo[slot] = Distance::Steps(0);
        return memo[slot];
    }
    memo[slot] = Distance::InProgress;
    let mut best = None;
    for edge in state.out() {
        let Some(edge) = graph.edge(*edge) else { continue };
        if let Distance::Steps(d) = distance(graph, edge.to(), memo) {
            if best.map_or(true, |b| d + 1 < b) {
                best = Some(d + 1);
            }
        }
    }
    memo[slot] = best.map_or(Distance::Unreachable, Distance::Steps);
    memo[slot]
}
