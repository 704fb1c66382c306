// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Performance benchmarks for flightgroup.
//!
//! Run with: cargo bench -p flightgroup

#![expect(missing_docs, reason = "Benchmark code")]

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use criterion::{Criterion, criterion_group, criterion_main};
use flightgroup::FlightGroup;

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_key() -> String {
    format!("key_{}", KEY_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Baseline: single call, no contention.
/// This measures the fixed overhead of registering and landing a flight.
fn bench_single_call(c: &mut Criterion) {
    let group = FlightGroup::<String, String>::new();

    c.bench_function("single_call", |b| {
        b.iter(|| black_box(group.work(unique_key(), || "value".to_string())));
    });
}

/// Eight threads hitting the same key at once.
fn bench_contention(c: &mut Criterion) {
    let group = FlightGroup::<String, String>::new();

    c.bench_function("contention_8_threads", |b| {
        b.iter(|| {
            let key = unique_key();
            thread::scope(|s| {
                for _ in 0..8 {
                    let key = key.clone();
                    let group = &group;
                    s.spawn(move || black_box(group.work(key, || "value".to_string())));
                }
            });
        });
    });
}

criterion_group!(benches, bench_single_call, bench_contention);
criterion_main!(benches);
