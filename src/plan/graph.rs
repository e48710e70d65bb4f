use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::model::{ItemId, Query};
use crate::strategy::{Application, EffectRecord, Strategy};

/// Index of a state in a [`TransformationGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u32);

impl StateId {
    /// The state holding the query the search started from.
    pub const START: StateId = StateId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Index of a rewrite edge in a [`TransformationGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub u32);

impl EdgeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One candidate query state.
#[derive(Debug)]
pub struct StateVertex {
    query: Query,
    out: Vec<EdgeId>,
    consolidated: bool,
}

impl StateVertex {
    /// Query in this state.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Outgoing rewrites in discovery order.
    pub fn out(&self) -> &[EdgeId] {
        &self.out
    }

    /// Whether the state is a goal.
    pub fn is_consolidated(&self) -> bool {
        self.consolidated
    }
}

/// One rewrite application between two states.
#[derive(Debug)]
pub struct StateEdge {
    from: StateId,
    to: StateId,
    vertex: ItemId,
    strategy: Arc<dyn Strategy>,
    application: Application,
    effect: EffectRecord,
}

impl StateEdge {
    /// State the rewrite was applied to.
    pub fn from(&self) -> StateId {
        self.from
    }

    /// State the rewrite produced (possibly shared with other edges).
    pub fn to(&self) -> StateId {
        self.to
    }

    /// Vertex of the source state the strategy was asked about.
    pub fn vertex(&self) -> ItemId {
        self.vertex
    }

    /// Strategy that produced the rewrite.
    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    /// Application that was applied.
    pub fn application(&self) -> &Application {
        &self.application
    }

    /// What the rewrite produced.
    pub fn effect(&self) -> &EffectRecord {
        &self.effect
    }

    /// `strategy:args`
    pub fn describe(&self) -> String {
        format!("{}:{}", self.strategy.name(), self.application.arg_string())
    }
}

/// Deduplicated search graph of query states.
///
/// States are looked up by [`Query::fingerprint`] and confirmed with
/// [`Query::content_eq`], so two rewrites reaching the same content share a
/// state.
#[derive(Debug)]
pub struct TransformationGraph {
    states: Vec<StateVertex>,
    edges: Vec<StateEdge>,
    index: FxHashMap<u64, SmallVec<[StateId; 1]>>,
}

impl TransformationGraph {
    /// Graph holding only the start state.
    pub fn new(start: Query) -> Self {
        let mut graph = Self {
            states: Vec::new(),
            edges: Vec::new(),
            index: FxHashMap::default(),
        };
        graph.add_state(start);
        graph
    }

    pub(crate) fn add_state(&mut self, query: Query) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.index.entry(query.fingerprint()).or_default().push(id);
        let consolidated = query.is_consolidated();
        self.states.push(StateVertex {
            query,
            out: Vec::new(),
            consolidated,
        });
        id
    }

    pub(crate) fn add_edge(
        &mut self,
        from: StateId,
        to: StateId,
        vertex: ItemId,
        strategy: Arc<dyn Strategy>,
        application: Application,
        effect: EffectRecord,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(StateEdge {
            from,
            to,
            vertex,
            strategy,
            application,
            effect,
        });
        if let Some(state) = self.states.get_mut(from.index()) {
            state.out.push(id);
        }
        id
    }

    /// Existing state whose query has the same content as `query`.
    pub fn find(&self, query: &Query) -> Option<StateId> {
        self.index
            .get(&query.fingerprint())?
            .iter()
            .copied()
            .find(|id| self.states[id.index()].query.content_eq(query))
    }

    /// Whether `target` is reachable from `from` (a state reaches itself).
    pub fn reaches(&self, from: StateId, target: StateId) -> bool {
        let mut seen = vec![false; self.states.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            let Some(state) = self.states.get(id.index()) else {
                continue;
            };
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            stack.extend(state.out.iter().map(|e| self.edges[e.index()].to));
        }
        false
    }

    /// State by id.
    pub fn state(&self, id: StateId) -> Option<&StateVertex> {
        self.states.get(id.index())
    }

    /// Edge by id.
    pub fn edge(&self, id: EdgeId) -> Option<&StateEdge> {
        self.edges.get(id.index())
    }

    /// Query the search started from.
    pub fn start(&self) -> &Query {
        &self.states[StateId::START.index()].query
    }

    /// Every state in creation order.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &StateVertex)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (StateId(i as u32), s))
    }

    /// Every edge in creation order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &StateEdge)> {
        self.edges.iter().enumerate().map(|(i, e)| (EdgeId(i as u32), e))
    }

    /// Number of states.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Edges that ended on an already known state.
    pub fn num_shared_targets(&self) -> usize {
        (self.edges.len() + 1).saturating_sub(self.states.len())
    }

    /// Goal states in creation order.
    pub fn consolidated_states(&self) -> Vec<StateId> {
        self.states()
            .filter(|(_, s)| s.consolidated)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use crate::strategy::{GetVertex, Strategy};

    fn chain(names: &[&str]) -> Query {
        let mut q = Query::new("chain", "");
        let root = q.root();
        for name in names {
            q.add_vertex(root, Item::vertex(*name).unwrap()).unwrap();
        }
        q
    }

    #[test]
    fn find_uses_content_not_identity() {
        let graph = TransformationGraph::new(chain(&["A", "B"]));
        assert_eq!(graph.find(&chain(&["A", "B"])), Some(StateId::START));
        assert_eq!(graph.find(&chain(&["A", "C"])), None);
    }

    #[test]
    fn reachability_follows_edges() {
        let start = chain(&["A"]);
        let a = start.item_by_name("A").unwrap();
        let strategy: Arc<dyn Strategy> = Arc::new(GetVertex);
        let app = strategy.applications(&start, a).unwrap().remove(0);
        let (next, effect) = strategy.apply(&start, &app).unwrap().into_parts().unwrap();

        let mut graph = TransformationGraph::new(start);
        let to = graph.add_state(next);
        graph.add_edge(StateId::START, to, a, strategy, app, effect);
        assert!(graph.reaches(StateId::START, to));
        assert!(!graph.reaches(to, StateId::START));
        assert!(graph.reaches(to, to));
        assert_eq!(graph.consolidated_states(), vec![to]);
        assert_eq!(graph.num_shared_targets(), 0);
        assert_eq!(graph.edge(EdgeId(0)).unwrap().describe(), "get-vertex:A");
    }
}
