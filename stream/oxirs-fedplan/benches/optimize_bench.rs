//! Federated Optimizer Benchmark
//!
//! Benchmarks for the planning pipeline:
//! 1. Full optimize over growing subject stars
//! 2. Ownership probing with and without parallel fan-out
//! 3. Cardinality estimation of wide joins

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use oxirs_fedplan::{
    cardinality, AlgebraTree, FederationOptimizer, Member, MemoryMember, NodeId, OptimizerConfig,
    OwnershipAnalyzer, Quad, StatementPattern, Term, Var,
};

use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// Benchmark Utilities
// ============================================================================

const FOAF: &str = "http://xmlns.com/foaf/0.1/";

fn foaf(local: &str) -> Term {
    Term::iri(format!("{FOAF}{local}"))
}

fn ex(local: &str) -> Term {
    Term::iri(format!("http://ex.org/{local}"))
}

/// Members holding `people` subjects each, described by `props` FOAF
/// properties plus one shared `ex:knows` edge
fn create_federation(members: usize, people: usize, props: usize) -> Vec<Arc<dyn Member>> {
    (0..members)
        .map(|m| {
            let mut member = MemoryMember::new(format!("member{m}"));
            for p in 0..people {
                let subject = ex(&format!("person{m}_{p}"));
                for prop in 0..props {
                    member.insert(Quad::triple(
                        subject.clone(),
                        foaf(&format!("prop{prop}")),
                        Term::literal(format!("value{p}_{prop}")),
                    ));
                }
                member.insert(Quad::triple(subject, ex("knows"), ex("someone")));
            }
            Arc::new(member) as Arc<dyn Member>
        })
        .collect()
}

/// Subject star of `width` FOAF patterns joined with a shared `ex:knows`
fn create_star_query(width: usize) -> AlgebraTree {
    let mut tree = AlgebraTree::new();
    let mut args: Vec<NodeId> = (0..width)
        .map(|i| {
            tree.pattern(StatementPattern::new(
                Var::new("s"),
                Var::constant(foaf(&format!("prop{i}"))),
                Var::new(format!("v{i}")),
            ))
        })
        .collect();
    args.push(tree.pattern(StatementPattern::new(
        Var::new("s"),
        Var::constant(ex("knows")),
        Var::new("friend"),
    )));
    let root = tree.nary_join(args);
    tree.set_root(root);
    tree
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_optimize_star(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_star");
    let members = create_federation(4, 50, 8);
    let optimizer =
        FederationOptimizer::new(OptimizerConfig::default().with_local_namespaces([FOAF]));

    for width in [2, 4, 8].iter() {
        let query = create_star_query(*width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &query, |b, query| {
            b.iter(|| {
                let mut tree = query.clone();
                let report = optimizer.optimize(&mut tree, &members);
                black_box((tree, report))
            });
        });
    }

    group.finish();
}

fn bench_probe_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("probe_fan_out");
    let local = HashSet::new();

    for size in [2, 8, 16].iter() {
        let members = create_federation(*size, 20, 4);
        let query = create_star_query(4);
        for parallel in [false, true] {
            let id = format!("{}/{}", size, if parallel { "parallel" } else { "sequential" });
            group.bench_function(BenchmarkId::from_parameter(id), |b| {
                b.iter(|| {
                    let mut analyzer =
                        OwnershipAnalyzer::new(&members, &local).with_parallel_probes(parallel);
                    black_box(analyzer.single_owner(&query, query.root()))
                });
            });
        }
    }

    group.finish();
}

fn bench_cardinality(c: &mut Criterion) {
    let mut group = c.benchmark_group("cardinality");

    for width in [4, 16, 64].iter() {
        let query = create_star_query(*width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &query, |b, query| {
            b.iter(|| black_box(cardinality(query, query.root())));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_optimize_star,
    bench_probe_fan_out,
    bench_cardinality
);
criterion_main!(benches);
