//! Benchmark: write propagation (sync fan-out, computed reads, batched flush)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{BatchQueue, Effect, EffectOptions, Observable, Record, Runtime};

fn fan_out(
    runtime: &Runtime,
    size: usize,
    options: impl Fn() -> EffectOptions,
) -> (Observable, Vec<Effect<()>>) {
    let state = runtime.observable(Record::new().with("count", 0));
    let effects = (0..size)
        .map(|_| {
            let state = state.clone();
            runtime
                .effect_with(
                    move || {
                        black_box(state.get("count"));
                    },
                    options(),
                )
                .unwrap()
        })
        .collect();
    (state, effects)
}

fn benchmark_sync_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_fan_out");
    for size in [1, 10, 100] {
        let runtime = Runtime::new();
        let (state, _effects) = fan_out(&runtime, size, EffectOptions::new);
        let mut n = 0i64;

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                n += 1;
                state.set("count", n).unwrap();
            });
        });
    }
    group.finish();
}

fn benchmark_batched_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_fan_out");
    for size in [1, 10, 100] {
        let runtime = Runtime::new();
        let queue = BatchQueue::manual();
        let (state, _effects) = fan_out(&runtime, size, || {
            EffectOptions::new().scheduler(queue.scheduler())
        });
        let mut n = 0i64;

        // Ten writes per flush; each effect runs once.
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                for _ in 0..10 {
                    n += 1;
                    state.set("count", n).unwrap();
                }
                black_box(queue.flush().unwrap())
            });
        });
    }
    group.finish();
}

fn benchmark_computed_read(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = runtime.observable(Record::new().with("count", 1));
    let doubled = runtime.computed({
        let state = state.clone();
        move || state.get("count").as_i64().unwrap_or(0) * 2
    });

    c.bench_function("computed_cached_read", |b| {
        b.iter(|| black_box(doubled.get().unwrap()));
    });

    let mut n = 0i64;
    c.bench_function("computed_read_after_write", |b| {
        b.iter(|| {
            n += 1;
            state.set("count", n).unwrap();
            black_box(doubled.get().unwrap())
        });
    });
}

criterion_group!(
    benches,
    benchmark_sync_fan_out,
    benchmark_batched_fan_out,
    benchmark_computed_read
);
criterion_main!(benches);
