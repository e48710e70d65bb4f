#![allow(missing_docs)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use qgraph::model::{Annotation, Constraint, ConstraintSide, Item, Provenance, Query};
use qgraph::validate::validate;

fn lower_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,4}", 2..8).prop_map(|set| set.into_iter().collect())
}

fn chain(name: &str, vertices: &[String]) -> Query {
    let mut q = Query::new(name, "");
    let root = q.root();
    for v in vertices {
        q.add_vertex(root, Item::vertex(v.as_str()).unwrap()).unwrap();
    }
    let mut ordered: Vec<&String> = vertices.iter().collect();
    ordered.sort();
    for (i, pair) in ordered.windows(2).enumerate() {
        let edge = Item::edge(format!("E{i}"), pair[0].as_str(), pair[1].as_str(), true).unwrap();
        q.add_edge(root, edge).unwrap();
    }
    q
}

proptest! {
    #[test]
    fn duplicate_names_are_rejected_anywhere(
        names in lower_names(),
        pick in any::<prop::sample::Index>(),
        nested in any::<bool>(),
        as_edge in any::<bool>(),
    ) {
        let mut q = chain("dup", &names);
        let sub = q.add_subquery(q.root(), None).unwrap();
        let target = if nested { sub } else { q.root() };
        let before = q.items(true).len();

        let taken = pick.get(&names).clone();
        let err = if as_edge {
            let edge = Item::edge(taken, names[0].as_str(), names[1].as_str(), false).unwrap();
            q.add_edge(target, edge).unwrap_err()
        } else {
            q.add_vertex(target, Item::vertex(taken).unwrap()).unwrap_err()
        };
        prop_assert_eq!(err.code(), "invalid_state");
        prop_assert_eq!(q.items(true).len(), before);
    }

    #[test]
    fn absorbing_moves_every_other_edge_onto_the_kept_vertex(
        touches_kept in prop::collection::vec(any::<bool>(), 1..6),
        b_in_subquery in any::<bool>(),
    ) {
        let mut q = Query::new("absorb", "");
        let root = q.root();
        q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
        let home = if b_in_subquery { q.add_subquery(root, None).unwrap() } else { root };
        let b = q.add_vertex(home, Item::vertex("B").unwrap()).unwrap();
        let y = q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap()).unwrap();
        prop_assert_eq!(q.crosses_boundary(y).unwrap(), b_in_subquery);
        let mut outward = Vec::new();
        let mut parallel = Vec::new();
        for (i, also_a) in touches_kept.iter().enumerate() {
            let far = format!("C{i}");
            q.add_vertex(root, Item::vertex(far.as_str()).unwrap()).unwrap();
            outward.push(q.add_edge(root, Item::edge(format!("E{i}"), "B", far, true).unwrap()).unwrap());
            if *also_a {
                parallel.push(q.add_edge(root, Item::edge(format!("M{i}"), "A", "B", false).unwrap()).unwrap());
            }
        }

        let containers: Vec<_> = q
            .edges(true)
            .into_iter()
            .filter(|e| *e != y)
            .map(|e| (e, q.item(e).unwrap().container()))
            .collect();

        q.absorb_edge_and_vertex(y, b).unwrap();

        let a = q.item_by_name("A").unwrap();
        prop_assert!(q.item_by_name("B").is_none());
        prop_assert!(q.item_by_name("Y").is_none());
        for edge in outward {
            let (from, _) = q.item(edge).unwrap().as_edge().unwrap().endpoints().unwrap();
            prop_assert_eq!(from, a);
        }
        for edge in parallel {
            prop_assert!(q.item(edge).unwrap().as_edge().unwrap().is_self_loop());
        }
        prop_assert_eq!(q.vertex_edges(a).unwrap().len(), q.num_edges(true));
        for (edge, container) in containers {
            prop_assert_eq!(q.item(edge).unwrap().container(), container);
        }
    }

    #[test]
    fn consolidation_breaks_on_any_addition(names in lower_names(), change in 0usize..5) {
        let mut q = Query::new("one", "");
        let root = q.root();
        let v = q.add_vertex(root, Item::composite(names.clone()).unwrap()).unwrap();
        prop_assert!(q.is_consolidated());

        let first = names[0].clone();
        match change {
            0 => {
                q.add_edge(root, Item::edge("LOOP", first.as_str(), first.as_str(), false).unwrap())
                    .unwrap();
            }
            1 => {
                q.add_subquery(root, None).unwrap();
            }
            2 => {
                let c = Constraint::new(
                    "ne",
                    ConstraintSide::item(first.as_str()),
                    ConstraintSide::item(names[1].as_str()),
                )
                .unwrap();
                q.add_constraint(root, c).unwrap();
            }
            3 => q.item_mut(v).unwrap().set_annotation(Some(Annotation::at_least(1))),
            _ => {
                let marker = Provenance::new("X", "X", Some(1)).unwrap();
                q.item_mut(v).unwrap().set_provenance(Some(marker)).unwrap();
            }
        }
        prop_assert!(!q.is_consolidated());
    }

    #[test]
    fn content_equality_is_symmetric(names in lower_names(), pick in any::<prop::sample::Index>()) {
        let mut reversed = names.clone();
        reversed.reverse();
        let left = chain("left", &names);
        let right = chain("right", &reversed);
        prop_assert!(left.content_eq(&right));
        prop_assert!(right.content_eq(&left));
        prop_assert_eq!(left.fingerprint(), right.fingerprint());

        let mut renamed = names.clone();
        let slot = pick.index(renamed.len());
        renamed[slot] = format!("Q{}", renamed[slot]);
        let changed = chain("changed", &renamed);
        prop_assert!(!left.content_eq(&changed));
        prop_assert!(!changed.content_eq(&left));
    }
}

#[test]
fn optional_disconnected_vertex_keeps_query_connected() {
    let mut q = Query::new("conn", "");
    let root = q.root();
    q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
    q.add_vertex(root, Item::vertex("B").unwrap()).unwrap();
    q.add_edge(root, Item::edge("Y", "A", "B", false).unwrap()).unwrap();
    let c = q
        .add_vertex(root, Item::vertex("C").unwrap().with_annotation(Annotation::at_least(0)))
        .unwrap();
    assert!(validate(&q).is_ok());

    q.item_mut(c).unwrap().set_annotation(None);
    let err = validate(&q).unwrap_err();
    let violations: BTreeSet<&str> = err.violations().iter().map(String::as_str).collect();
    assert!(violations.contains("query (without negated elements) is not connected"));
}
