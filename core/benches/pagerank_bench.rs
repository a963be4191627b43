use criterion::{criterion_group, criterion_main, Criterion};
use linkrank_core::pagerank::compute;
use linkrank_core::{DocId, Edge, RankConfig};

// Each page links to the next three, wrapping around.
fn ring(n: u64) -> (Vec<DocId>, Vec<Edge>) {
    let docs: Vec<DocId> = (0..n).collect();
    let mut edges = Vec::new();
    for d in 0..n {
        for step in 1..=3 {
            edges.push(Edge { id: edges.len() as u64, from: d, to: (d + step) % n });
        }
    }
    (docs, edges)
}

fn bench_pagerank(c: &mut Criterion) {
    let (docs, edges) = ring(2_000);
    let config = RankConfig::default();
    c.bench_function("pagerank_ring_2000", |b| b.iter(|| compute(&docs, &edges, &config)));
}

criterion_group!(benches, bench_pagerank);
criterion_main!(benches);
