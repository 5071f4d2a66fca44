use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput};
use msf_harness::{
    graph::{Party, generate_bounded, generate_unique},
    stats::StatsRecord,
};

pub fn generate_benchmark(c: &mut Criterion) {
    let mut g = c.benchmark_group("generate");
    for vertices in [1_000u32, 10_000, 100_000] {
        let edges = 3 * vertices as usize;
        g.throughput(Throughput::Elements(edges as u64));
        g.bench_with_input(BenchmarkId::new("unique", vertices), &edges, |b, &edges| {
            let key = format!("unique-{vertices}-{edges}-1");
            b.iter(|| generate_unique(vertices, edges, black_box(&key)).unwrap())
        });
        // the smallest density of the sweep crowds the triple space the most
        g.bench_with_input(BenchmarkId::new("bounded-0.02", vertices), &edges, |b, &edges| {
            let key = format!("bounded-{vertices}-{edges}-0.02-1");
            b.iter(|| generate_bounded(vertices, edges, 0.02, black_box(&key)).unwrap())
        });
    }
    g.finish();

    let split = generate_unique(10_000, 30_000, "unique-10000-30000-1").unwrap();
    c.bench_function("render party input", |b| {
        b.iter(|| black_box(&split).render(Party::Zero))
    });

    let stats = "iterations 12\nphase1 1 2 3 4\ncomm1 100 200\nphase2 5 6 7 8\ncomm2 300 400\n\
                 mults 1 2 3\nsubgraphs 2:900 3:120 4:40 5:7 9:1\n";
    c.bench_function("parse stats", |b| {
        b.iter(|| StatsRecord::parse(black_box(stats)).unwrap())
    });
}
