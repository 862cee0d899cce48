//! Throughput Benchmark for sockloop
//!
//! Measures the per-dispatch bookkeeping the event loop does around every
//! handler call: failure classification and timer accounting.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sockloop::connection::{classify, classify_io, classify_message, HandlerError};
use sockloop::metrics::TimerMetrics;
use std::io;

/// Benchmark failure classification
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));

    group.bench_function("io_kind", |b| {
        let err = io::Error::from(io::ErrorKind::ConnectionReset);
        b.iter(|| black_box(classify_io(black_box(&err))));
    });

    group.bench_function("io_message_fallback", |b| {
        let err = io::Error::new(io::ErrorKind::Other, "unable to write to socket");
        b.iter(|| black_box(classify_io(black_box(&err))));
    });

    group.bench_function("message_other", |b| {
        let message = "handler rejected frame: length prefix exceeds limit";
        b.iter(|| black_box(classify_message(black_box(message))));
    });

    group.bench_function("handler_error", |b| {
        let err = HandlerError::Failed("connection closed by peer".into());
        b.iter(|| black_box(classify(black_box(&err))));
    });

    group.finish();
}

/// Benchmark timer start/end pairs
fn bench_timers(c: &mut Criterion) {
    let mut group = c.benchmark_group("timers");
    group.throughput(Throughput::Elements(1));

    group.bench_function("start_end_same_name", |b| {
        let mut metrics = TimerMetrics::new();
        b.iter(|| {
            metrics.start_timer("client.dispatch");
            black_box(metrics.end_timer("client.dispatch"));
        });
    });

    group.bench_function("start_end_many_names", |b| {
        let mut metrics = TimerMetrics::new();
        let names: Vec<String> = (0..64).map(|i| format!("timer.{}", i)).collect();
        let mut i = 0usize;
        b.iter(|| {
            let name = &names[i % names.len()];
            metrics.start_timer(name);
            black_box(metrics.end_timer(name));
            i += 1;
        });
    });

    group.bench_function("end_without_start", |b| {
        let mut metrics = TimerMetrics::new();
        b.iter(|| black_box(metrics.end_timer("missing")));
    });

    group.finish();
}

criterion_group!(benches, bench_classify, bench_timers);
criterion_main!(benches);
