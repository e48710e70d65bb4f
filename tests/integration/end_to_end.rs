#![allow(missing_docs)]

use std::collections::BTreeSet;

use qgraph::backend::{ContainerStore, MemoryBackend};
use qgraph::config::EngineConfig;
use qgraph::model::{Annotation, Condition, Constraint, ConstraintSide, DerivedLinkSpec, Item, Query};
use qgraph::value::Value;
use qgraph::{QuerySession, RunOutcome};

fn kind(value: &str) -> Condition {
    Condition::eq("kind", value).expect("condition")
}

fn annotated_pair(edge: Annotation, target: Annotation) -> Query {
    let mut q = Query::new("annotated-pair", "");
    let root = q.root();
    q.add_vertex(root, Item::vertex("A").unwrap().with_condition(kind("a")))
        .unwrap();
    q.add_vertex(
        root,
        Item::vertex("B").unwrap().with_condition(kind("b")).with_annotation(target),
    )
    .unwrap();
    q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap().with_annotation(edge))
        .unwrap();
    q
}

fn plain_pair() -> Query {
    let mut q = Query::new("pair", "");
    let root = q.root();
    q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
    q.add_vertex(root, Item::vertex("B").unwrap()).unwrap();
    q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap()).unwrap();
    q
}

fn completed(outcome: RunOutcome) -> (Vec<String>, qgraph::exec::ExecutionReport) {
    match outcome {
        RunOutcome::Completed { plan, report } => {
            let steps = plan
                .steps
                .iter()
                .map(|s| format!("{}:{}", s.strategy, s.args))
                .collect();
            (steps, report)
        }
        other => panic!("query did not run: {other:?}"),
    }
}

fn object_ids(backend: &MemoryBackend, container: &str) -> BTreeSet<i64> {
    let snapshot = backend.container(container).expect("container");
    snapshot
        .subgraph_ids()
        .into_iter()
        .flat_map(|subg| snapshot.objects_in(subg))
        .map(|(id, _)| id)
        .collect()
}

#[test]
fn annotated_target_runs_in_two_steps() {
    let backend = MemoryBackend::new();
    backend.add_object(1, [("kind", "a")]);
    backend.add_object(2, [("kind", "b")]);
    backend.add_link(10, 1, 2, [("type", "x")]);
    let query = annotated_pair(Annotation::exactly(1), Annotation::at_least(1));

    assert!(!backend.has_child("result").unwrap());
    let outcome = QuerySession::default().run(&query, &backend, "result").unwrap();
    let (steps, report) = completed(outcome);

    assert_eq!(steps, vec!["get-vertex:A", "absorb-annotated-vertex:A|Y|B"]);
    assert!(backend.has_child("result").unwrap());
    assert_eq!(report.subgraphs, 1);
    let snapshot = backend.container("result").unwrap();
    let subg = *snapshot.subgraph_ids().iter().next().unwrap();
    assert_eq!(
        snapshot.objects_in(subg),
        vec![(1, "A".to_owned()), (2, "B".to_owned())]
    );
    assert_eq!(snapshot.links_in(subg), vec![(10, "Y".to_owned())]);
    assert_eq!(backend.live_tables(), 0);
}

#[test]
fn upper_bound_drops_subgraphs_with_too_many_instances() {
    let backend = MemoryBackend::new();
    backend.add_object(1, [("kind", "a")]);
    backend.add_object(2, [("kind", "b")]);
    backend.add_object(3, [("kind", "b")]);
    backend.add_object(4, [("kind", "a")]);
    backend.add_object(5, [("kind", "b")]);
    backend.add_link(10, 1, 2, [("type", "x")]);
    backend.add_link(11, 1, 3, [("type", "x")]);
    backend.add_link(12, 4, 5, [("type", "x")]);
    let query = annotated_pair(Annotation::at_least(1), Annotation::range(1, 1).unwrap());

    let outcome = QuerySession::default().run(&query, &backend, "result").unwrap();
    let (steps, report) = completed(outcome);

    assert_eq!(
        steps,
        vec![
            "get-vertex:A",
            "absorb-annotated-vertex:A|Y|B",
            "apply-upper-limit:A.B.Y",
        ]
    );
    assert_eq!(report.subgraphs, 1);
    assert_eq!(object_ids(&backend, "result"), BTreeSet::from([4, 5]));
}

#[test]
fn negated_target_keeps_only_unlinked_sources() {
    let backend = MemoryBackend::new();
    backend.add_object(1, [("kind", "a")]);
    backend.add_object(2, [("kind", "b")]);
    backend.add_object(3, [("kind", "a")]);
    backend.add_link(10, 1, 2, [("type", "x")]);
    let query = annotated_pair(Annotation::at_least(1), Annotation::exactly(0));

    let outcome = QuerySession::default().run(&query, &backend, "lonely").unwrap();
    let (_, report) = completed(outcome);

    assert_eq!(report.subgraphs, 1);
    assert_eq!(object_ids(&backend, "lonely"), BTreeSet::from([3]));
}

#[test]
fn constraint_filters_matched_pairs() {
    let backend = MemoryBackend::new();
    backend.add_object(1, [("age", 40_i64)]);
    backend.add_object(2, [("age", 30_i64)]);
    backend.add_object(3, [("age", 20_i64)]);
    backend.add_object(4, [("age", 50_i64)]);
    backend.add_link(10, 1, 2, [("type", "x")]);
    backend.add_link(11, 3, 4, [("type", "x")]);
    let mut query = plain_pair();
    let root = query.root();
    let older = Constraint::new(
        "gt",
        ConstraintSide::attribute("A", "age"),
        ConstraintSide::attribute("B", "age"),
    )
    .unwrap();
    query.add_constraint(root, older).unwrap();

    let outcome = QuerySession::default().run(&query, &backend, "older").unwrap();
    let (steps, report) = completed(outcome);

    assert_eq!(steps.len(), 4);
    assert!(steps[3].starts_with("process-constraint:A.B.Y"));
    assert_eq!(report.subgraphs, 1);
    assert_eq!(object_ids(&backend, "older"), BTreeSet::from([1, 2]));
}

#[test]
fn literal_constraint_filters_matched_pairs() {
    let backend = MemoryBackend::new();
    backend.add_object(1, [("age", 40_i64)]);
    backend.add_object(2, [("age", 30_i64)]);
    backend.add_object(3, [("age", 20_i64)]);
    backend.add_object(4, [("age", 50_i64)]);
    backend.add_link(10, 1, 2, [("type", "x")]);
    backend.add_link(11, 3, 4, [("type", "x")]);
    let mut query = plain_pair();
    let root = query.root();
    let senior = Constraint::new(
        "ge",
        ConstraintSide::attribute("B", "age"),
        ConstraintSide::literal(50_i64),
    )
    .unwrap();
    query.add_constraint(root, senior).unwrap();

    let outcome = QuerySession::default().run(&query, &backend, "senior").unwrap();
    let (steps, report) = completed(outcome);

    assert!(steps[3].starts_with("process-constraint:A.B.Y"));
    assert!(steps[3].ends_with("B.age ge 50"));
    assert_eq!(report.subgraphs, 1);
    assert_eq!(object_ids(&backend, "senior"), BTreeSet::from([3, 4]));
}

#[test]
fn derived_links_connect_matched_endpoints() {
    let backend = MemoryBackend::new();
    for id in 1..=4 {
        backend.add_object(id, [("kind", if id % 2 == 1 { "a" } else { "b" })]);
    }
    backend.add_link(10, 1, 2, [("type", "x")]);
    backend.add_link(11, 3, 4, [("type", "x")]);
    let mut query = plain_pair();
    let root = query.root();
    query
        .add_derived_link(root, DerivedLinkSpec::new("A", "B", "rel", "derived").unwrap())
        .unwrap();

    let outcome = QuerySession::default().run(&query, &backend, "linked").unwrap();
    let (_, report) = completed(outcome);

    assert_eq!(report.subgraphs, 2);
    assert_eq!(report.derived_links, 2);
    assert_eq!(backend.link_count(), 4);
    let mut created = BTreeSet::new();
    for id in [12, 13] {
        let (o1, o2, attrs) = backend.link(id).unwrap();
        assert_eq!(attrs.get("rel"), Some(&Value::String("derived".into())));
        created.insert((o1, o2));
    }
    assert_eq!(created, BTreeSet::from([(1, 2), (3, 4)]));
}

#[test]
fn existing_destination_needs_replace() {
    let backend = MemoryBackend::new();
    backend.add_object(1, [("kind", "a")]);
    backend.add_object(2, [("kind", "b")]);
    backend.add_link(10, 1, 2, [("type", "x")]);
    let query = plain_pair();

    let session = QuerySession::default();
    session.run(&query, &backend, "result").unwrap();
    let err = session.run(&query, &backend, "result").unwrap_err();
    assert_eq!(err.code(), "invalid_state");

    let mut config = EngineConfig::default();
    config.executor.replace_existing = true;
    let outcome = QuerySession::new(config).run(&query, &backend, "result").unwrap();
    let (_, report) = completed(outcome);
    assert_eq!(report.subgraphs, 1);
    assert_eq!(backend.live_tables(), 0);
}

#[test]
fn commit_failure_leaves_no_container() {
    let backend = MemoryBackend::new();
    backend.add_object(1, [("kind", "a")]);
    backend.add_object(2, [("kind", "b")]);
    backend.add_link(10, 1, 2, [("type", "x")]);
    backend.set_fail_on_commit(true);

    let err = QuerySession::default()
        .run(&plain_pair(), &backend, "result")
        .unwrap_err();
    assert_eq!(err.code(), "execution");
    assert!(err.to_string().starts_with("step 1/3 get-vertex:A failed"));
    assert!(!backend.has_child("result").unwrap());
    assert_eq!(backend.live_tables(), 0);
}
