//! Benchmarks for the two hottest primitives in this crate: `RangeList`
//! insertion (called once per loaded segment/relocation) and dominator
//! computation over a synthetic chain-of-diamonds control-flow graph
//! (called at least once per function during structuring).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use decompiler_core::address::RangeList;
use decompiler_core::block::{BasicBlock, BlockGraph};

fn bench_rangelist_insert(c: &mut Criterion) {
    c.bench_function("rangelist_insert_1000_disjoint", |b| {
        b.iter(|| {
            let mut list = RangeList::new();
            for i in 0..1000u64 {
                list.insert_range(0, i * 0x10, i * 0x10 + 0x8);
            }
            black_box(list.len())
        })
    });
}

fn chain_of_diamonds(count: usize) -> BlockGraph {
    let mut graph = BlockGraph::new();
    let mut prev = graph.add_block(BasicBlock::new());
    graph.set_entry(prev);
    for _ in 0..count {
        let left = graph.add_block(BasicBlock::new());
        let right = graph.add_block(BasicBlock::new());
        let join = graph.add_block(BasicBlock::new());
        graph.add_edge(prev, left);
        graph.add_edge(prev, right);
        graph.add_edge(left, join);
        graph.add_edge(right, join);
        prev = join;
    }
    graph
}

fn bench_dominators(c: &mut Criterion) {
    c.bench_function("calc_forward_dominator_chain_of_200_diamonds", |b| {
        b.iter(|| {
            let mut g = chain_of_diamonds(200);
            let entry = g.entry_block().unwrap();
            g.calc_forward_dominator(entry);
            black_box(g.block_count())
        })
    });
}

criterion_group!(benches, bench_rangelist_insert, bench_dominators);
criterion_main!(benches);
