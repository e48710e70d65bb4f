//! Planner and executor benchmarks over chain-shaped queries.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qgraph::backend::MemoryBackend;
use qgraph::model::{Condition, Item, Query};
use qgraph::plan::{Planner, PlannerConfig};
use qgraph::QuerySession;

const CHAIN_LENGTHS: [usize; 3] = [2, 3, 4];
const DATA_WIDTH: i64 = 64;

fn chain(len: usize) -> Query {
    let mut q = Query::new(format!("chain{len}"), "");
    let root = q.root();
    for i in 0..len {
        let vertex = Item::vertex(format!("V{i}"))
            .and_then(|v| Ok(v.with_condition(Condition::eq("layer", i as i64)?)))
            .expect("vertex");
        q.add_vertex(root, vertex).expect("add vertex");
    }
    for i in 1..len {
        let edge = Item::edge(format!("E{i}"), format!("V{}", i - 1), format!("V{i}"), true)
            .expect("edge");
        q.add_edge(root, edge).expect("add edge");
    }
    q
}

/// `DATA_WIDTH` objects per layer, each linked to the object with the same
/// offset in the next layer.
fn layered(len: usize) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for layer in 0..len as i64 {
        for offset in 0..DATA_WIDTH {
            backend.add_object(layer * DATA_WIDTH + offset + 1, [("layer", layer)]);
        }
    }
    let mut link = 1_000_000;
    for layer in 1..len as i64 {
        for offset in 0..DATA_WIDTH {
            let from = (layer - 1) * DATA_WIDTH + offset + 1;
            let to = layer * DATA_WIDTH + offset + 1;
            backend.add_link(link, from, to, [("type", "next")]);
            link += 1;
        }
    }
    backend
}

fn planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planner/chain");
    group.sample_size(20);
    for len in CHAIN_LENGTHS {
        let query = chain(len);
        group.bench_with_input(BenchmarkId::new("first_solution", len), &query, |b, q| {
            let planner = Planner::default();
            b.iter(|| black_box(planner.plan(q).expect("plan").graph().num_states()));
        });
        let exhaustive = PlannerConfig {
            exhaustive: true,
            ..PlannerConfig::default()
        };
        group.bench_with_input(BenchmarkId::new("exhaustive", len), &query, |b, q| {
            let planner = Planner::new(exhaustive.clone());
            b.iter(|| black_box(planner.plan(q).expect("plan").graph().num_states()));
        });
    }
    group.finish();
}

fn execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor/chain");
    group.sample_size(10);
    let session = QuerySession::default();
    for len in CHAIN_LENGTHS {
        let query = chain(len);
        let backend = layered(len);
        let mut run = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(len), &query, |b, q| {
            b.iter(|| {
                run += 1;
                let outcome = session
                    .run(q, &backend, &format!("bench-{run}"))
                    .expect("run");
                black_box(outcome);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, planning, execution);
criterion_main!(benches);
