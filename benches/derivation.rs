//! Criterion benchmarks for the derived-column expressions.

use criterion::{Criterion, criterion_group, criterion_main};
use cycler_ingest::expressions;
use polars::prelude::*;

fn synthetic_frame(rows: usize) -> DataFrame {
    let steps: Vec<i64> = (0..rows).map(|i| ((i / 100) % 10) as i64 + 1).collect();
    let charge: Vec<f64> = (0..rows).map(|i| (i % 1000) as f64 * 0.01).collect();
    let discharge: Vec<f64> = (0..rows)
        .map(|i| ((i + 500) % 1000) as f64 * 0.01)
        .collect();
    df!("Step" => steps, "chg" => charge, "dch" => discharge).unwrap()
}

fn bench_derivation(c: &mut Criterion) {
    let df = synthetic_frame(100_000);

    c.bench_function("cycle_event_derivation_100k", |b| {
        b.iter(|| {
            df.clone()
                .lazy()
                .select([expressions::cycle("Step"), expressions::event("Step")])
                .collect()
                .unwrap()
        })
    });

    c.bench_function("capacity_synthesis_100k", |b| {
        b.iter(|| {
            df.clone()
                .lazy()
                .select([expressions::capacity_from_counters("chg", "dch")])
                .collect()
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_derivation);
criterion_main!(benches);
