//! Event bus throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::Serialize;
use statebridge_bus::{BusConfig, EventBus};
use statebridge_types::{bus_event, Event};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
struct Toast {
    id: u64,
    message: String,
}
bus_event!(Toast => "ui:toastShown");

#[derive(Debug, Clone, Serialize)]
struct Updated {
    id: u64,
}
bus_event!(Updated => "session:updated");

fn bus(runtime: &tokio::runtime::Runtime, max_batch_size: usize, listeners: usize) -> (EventBus, Arc<AtomicU64>) {
    let bus = EventBus::with_runtime(
        BusConfig {
            max_batch_size,
            ..BusConfig::default()
        },
        runtime.handle().clone(),
    )
    .unwrap();
    let hits = Arc::new(AtomicU64::new(0));
    for _ in 0..listeners {
        let h = hits.clone();
        bus.on(move |e: &Event<Toast>| {
            h.fetch_add(e.payload().id, Ordering::Relaxed);
        });
        let h = hits.clone();
        bus.on(move |e: &Event<Updated>| {
            h.fetch_add(e.payload().id, Ordering::Relaxed);
        });
    }
    (bus, hits)
}

// =============================================================================
// Immediate dispatch
// =============================================================================

fn bench_high_priority(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("high_priority_emit");

    for listeners in [1usize, 4, 16] {
        let (bus, hits) = bus(&runtime, 100, listeners);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| {
                bus.emit(Toast {
                    id: 1,
                    message: "saved".to_string(),
                });
                black_box(hits.load(Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

// =============================================================================
// Batched dispatch
// =============================================================================

fn bench_batched(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("batched_emit");

    for batch in [10usize, 100, 1000] {
        let (bus, hits) = bus(&runtime, batch, 4);
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                for id in 0..batch as u64 {
                    bus.emit(Updated { id });
                }
                black_box(hits.load(Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_high_priority, bench_batched);
criterion_main!(benches);
