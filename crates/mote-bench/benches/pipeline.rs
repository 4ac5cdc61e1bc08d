//! Criterion benchmarks of whole simulation steps.

use criterion::{criterion_group, criterion_main, Criterion};
use mote_bench::reference_profile;

/// Benchmark: one default-pipeline step over 10K cells.
fn bench_reference_step(c: &mut Criterion) {
    let mut sim = reference_profile(42).unwrap();

    c.bench_function("reference_step_10k", |b| {
        b.iter(|| sim.simulate(1).unwrap());
    });
}

criterion_group!(benches, bench_reference_step);
criterion_main!(benches);
