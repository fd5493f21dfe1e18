//! Performance benchmarks for the pending-operation queue
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Enqueue and settle throughput for busy periods of growing size
//! - Cost of re-enqueueing a handle that is already tracked
//! - Listener fan-out when the queue drains
//! - Virtual-time event loop driving many delayed requests

use std::rc::Rc;

use compliance_ui::deferred::Deferred;
use compliance_ui::event_loop::EventLoop;
use compliance_ui::notifier::{NotifierConfig, PendingOperationQueue};
use compliance_ui::request::RequestFailure;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

type Op = Deferred<(), RequestFailure>;

/// Benchmark: one busy period of `size` operations settled in order
fn bench_busy_period(c: &mut Criterion) {
    let mut group = c.benchmark_group("busy_period");

    for size in [1usize, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("enqueue_then_settle", size), size, |b, &size| {
            b.iter(|| {
                let queue = PendingOperationQueue::default();
                let ops: Vec<Op> = (0..size).map(|_| Deferred::new()).collect();
                for op in &ops {
                    queue.enqueue(op).unwrap();
                }
                for op in &ops {
                    op.resolve(());
                }
                black_box(queue.stats())
            })
        });
    }

    group.finish();
}

/// Benchmark: enqueueing handles that are already pending or settled
fn bench_enqueue_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");

    group.bench_function("duplicate_handle", |b| {
        let queue = PendingOperationQueue::default();
        let op: Op = Deferred::new();
        queue.enqueue(&op).unwrap();
        b.iter(|| queue.enqueue(black_box(&op)).unwrap())
    });

    group.bench_function("already_settled_handle", |b| {
        let queue = PendingOperationQueue::default();
        let op: Op = Deferred::resolved(());
        b.iter(|| queue.enqueue(black_box(&op)).unwrap())
    });

    group.finish();
}

/// Benchmark: draining many distinct listeners
fn bench_listener_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("listeners");

    for count in [1usize, 16, 256].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("drain", count), count, |b, &count| {
            b.iter(|| {
                let queue = PendingOperationQueue::new(NotifierConfig::new());
                let op: Op = Deferred::new();
                queue.enqueue(&op).unwrap();
                for _ in 0..count {
                    queue.notify_when_empty(Rc::new(|| {
                        black_box(());
                    }));
                }
                op.resolve(());
            })
        });
    }

    group.finish();
}

/// Benchmark: event loop settling delayed requests tracked by the queue
fn bench_event_loop(c: &mut Criterion) {
    c.bench_function("event_loop_100_requests", |b| {
        b.iter(|| {
            let event_loop = EventLoop::new();
            let queue = PendingOperationQueue::default();
            for delay in 0..100u64 {
                let op: Op = event_loop.deferred();
                event_loop.resolve_after(&op, (delay * 7) % 50, ());
                queue.enqueue(&op).unwrap();
            }
            black_box(event_loop.run_until_idle())
        })
    });
}

criterion_group!(
    benches,
    bench_busy_period,
    bench_enqueue_paths,
    bench_listener_fan_out,
    bench_event_loop,
);

criterion_main!(benches);
