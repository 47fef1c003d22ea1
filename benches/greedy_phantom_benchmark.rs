//! Benchmarks for `GreedyPhantom`'s incremental `add`, mirroring the
//! teacher's `benches/serde_benchmark.rs` shape (one `criterion_group` per
//! concern, grouped `bench_function`s for related input sizes).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use phantom_dag::{Block, BlockId, Dag, GreedyPhantom, LazySet};

/// Builds a chain of `n` blocks, each one parent of the next, plus one
/// additional fork block off every 7th block — enough branching to exercise
/// coloring-tip re-pointing without the DAG being dominated by a single
/// straight line.
fn chain_with_forks(n: u64) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(n as usize);
    blocks.push(Block::genesis(BlockId::new(0)));
    let mut next_id = 1u64;
    let mut frontier = BlockId::new(0);
    while next_id < n {
        let parent = frontier;
        let id = BlockId::new(next_id);
        blocks.push(Block::new(id, [parent], 0, None));
        frontier = id;
        next_id += 1;

        if next_id % 7 == 0 && next_id < n {
            let fork_id = BlockId::new(next_id);
            blocks.push(Block::new(fork_id, [parent], 0, None));
            next_id += 1;
        }
    }
    blocks
}

fn bench_incremental_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("greedy_phantom_add");

    for size in [100u64, 1_000, 5_000] {
        let blocks = chain_with_forks(size);
        group.bench_with_input(BenchmarkId::new("add_chain_with_forks", size), &blocks, |b, blocks| {
            b.iter(|| {
                let mut dag = GreedyPhantom::new(10);
                for block in blocks {
                    dag.add(black_box(block.clone())).unwrap();
                }
                black_box(dag.coloring_tip());
            });
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("greedy_phantom_queries");

    let blocks = chain_with_forks(2_000);
    let mut dag = GreedyPhantom::new(10);
    for block in &blocks {
        dag.add(block.clone()).unwrap();
    }
    let first = blocks.first().unwrap().id();
    let last = blocks.last().unwrap().id();

    group.bench_function("is_a_before_b", |b| {
        b.iter(|| black_box(dag.is_a_before_b(black_box(first), black_box(last))));
    });

    group.bench_function("get_depth", |b| {
        b.iter(|| black_box(dag.get_depth(black_box(first))));
    });

    group.bench_function("coloring", |b| {
        b.iter(|| black_box(dag.coloring().len()));
    });

    group.finish();
}

fn bench_lazy_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("lazy_set");

    let base: std::collections::HashSet<u64> = (0..10_000).collect();
    let diff: std::collections::HashSet<u64> = (0..1_000).collect();

    group.bench_function("flatten_after_layering", |b| {
        b.iter(|| {
            let mut ls: LazySet<u64> = LazySet::new();
            ls.lazy_update(black_box(base.clone()));
            ls.lazy_difference_update(black_box(diff.clone()));
            black_box(ls.flatten(false));
        });
    });

    group.bench_function("contains_scan", |b| {
        let mut ls: LazySet<u64> = LazySet::new();
        ls.lazy_update(base.clone());
        ls.lazy_difference_update(diff.clone());
        b.iter(|| black_box(ls.contains(&black_box(9_999))));
    });

    group.finish();
}

criterion_group!(benches, bench_incremental_add, bench_queries, bench_lazy_set);
criterion_main!(benches);
