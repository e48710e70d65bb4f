#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use qgraph::model::{Annotation, Item, ItemId, Query};
use qgraph::plan::{Planner, PlannerConfig, SearchOutcome, StateId};
use qgraph::strategy::{
    default_strategies, Application, CollapseEdge, GetVertex, RewriteEffect, StepContext, StepInput,
    Strategy,
};

fn pair() -> Query {
    let mut q = Query::new("pair", "");
    let root = q.root();
    q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
    q.add_vertex(root, Item::vertex("B").unwrap()).unwrap();
    q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap()).unwrap();
    q
}

fn exhaustive() -> PlannerConfig {
    PlannerConfig {
        exhaustive: true,
        ..PlannerConfig::default()
    }
}

/// Annotates a plain vertex; the result is content-equal to its input.
#[derive(Debug)]
struct Annotate;

impl Strategy for Annotate {
    fn name(&self) -> &'static str {
        "annotate"
    }

    fn description(&self) -> &'static str {
        "annotate a plain vertex"
    }

    fn applications(&self, query: &Query, vertex: ItemId) -> qgraph::Result<Vec<Application>> {
        let item = query.item(vertex)?;
        if item.is_composite() || item.is_annotated() {
            return Ok(Vec::new());
        }
        Ok(vec![Application::new(query, &[vertex])?])
    }

    fn apply(&self, query: &Query, application: &Application) -> qgraph::Result<RewriteEffect> {
        let vertex = application.items()[0];
        let mut copy = query.clone();
        copy.item_mut(vertex)?.set_annotation(Some(Annotation::at_least(1)));
        Ok(RewriteEffect { query: copy, output: vertex })
    }

    fn generate(&self, _: &StepInput<'_>, _: &mut StepContext<'_, '_>) -> qgraph::Result<Option<String>> {
        Ok(None)
    }
}

#[test]
fn equal_states_are_shared_between_branches() {
    let strategies: Vec<Arc<dyn Strategy>> = vec![Arc::new(GetVertex), Arc::new(CollapseEdge)];
    let plan = Planner::with_strategies(strategies, exhaustive())
        .plan(&pair())
        .unwrap();
    let graph = plan.graph();

    assert_eq!(graph.num_states(), 5);

    let mut sources: BTreeMap<StateId, BTreeSet<StateId>> = BTreeMap::new();
    for (_, edge) in graph.edges() {
        sources.entry(edge.to()).or_default().insert(edge.from());
    }
    // {A*, B*} is reached from {A*, B} and from {A, B*}.
    let merged: Vec<StateId> = sources
        .iter()
        .filter(|(_, from)| from.len() == 2)
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(merged.len(), 1);
    let query = graph.state(merged[0]).unwrap().query();
    assert_eq!(query.num_vertices(true), 2);
    assert!(query
        .vertices(true)
        .iter()
        .all(|v| query.item(*v).unwrap().is_composite()));

    let states: Vec<&Query> = graph.states().map(|(_, s)| s.query()).collect();
    for (i, a) in states.iter().enumerate() {
        for b in &states[i + 1..] {
            assert!(!a.content_eq(b));
        }
    }
}

#[test]
fn first_solution_and_exhaustive_search_agree_on_length() {
    let quick = Planner::default().plan(&pair()).unwrap();
    let full = Planner::new(exhaustive()).plan(&pair()).unwrap();
    assert_eq!(quick.outcome(), SearchOutcome::Solved);
    assert_eq!(full.outcome(), SearchOutcome::Solved);
    assert_eq!(quick.path().unwrap().len(), 3);
    assert_eq!(full.path().unwrap().len(), 3);
    assert!(full.graph().num_states() > quick.graph().num_states());
}

#[test]
fn rewrite_back_to_an_ancestor_is_fatal() {
    let mut strategies = vec![Arc::new(Annotate) as Arc<dyn Strategy>];
    strategies.extend(default_strategies());
    let err = Planner::with_strategies(strategies, PlannerConfig::default())
        .plan(&pair())
        .unwrap_err();
    assert_eq!(err.code(), "invariant");
    assert!(err.is_fatal());
}

#[test]
fn plan_summary_serializes() {
    let plan = Planner::default().plan(&pair()).unwrap();
    let json = serde_json::to_value(plan.explain()).unwrap();
    assert_eq!(json["outcome"], "solved");
    assert_eq!(json["steps"][2]["strategy"], "collapse-edge");
    assert_eq!(json["steps"][2]["output"], "A.B.Y");
}
