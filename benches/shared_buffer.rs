//! Criterion benchmarks for the sampler/dispatcher hand-off.
//!
//! The buffer lock is the only point where the two loops contend, so append and
//! drain must stay cheap regardless of batch size.
//!
//! Run with: cargo bench --bench shared_buffer

use cansat_telemetry::encoding::encode_batch;
use cansat_telemetry::{Reading, SharedBuffer, SourceId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn cycle(len: usize) -> Vec<Reading> {
    (0..len)
        .map(|i| Reading::new(SourceId::ALL[i % SourceId::ALL.len()], i as u64, "21.50"))
        .collect()
}

/// Append one sampling cycle, then drain it.
fn append_then_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_buffer_cycle");

    // One sensor, a typical payload, a full IMU-heavy cycle
    for len in [1usize, 35, 256] {
        let buffer = SharedBuffer::new();
        let readings = cycle(len);

        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("append_drain", len), &len, |b, _| {
            b.iter(|| {
                buffer.append(black_box(readings.clone()));
                black_box(buffer.drain_all());
            });
        });
    }

    group.finish();
}

/// Drain while another thread keeps appending.
fn contended_drain(c: &mut Criterion) {
    c.bench_function("shared_buffer_contended_drain", |b| {
        let buffer = SharedBuffer::new();
        let producer_buffer = buffer.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let producer_stop = stop.clone();

        let producer = thread::spawn(move || {
            let readings = cycle(35);
            while !producer_stop.load(Ordering::Relaxed) {
                producer_buffer.append(readings.clone());
            }
        });

        b.iter(|| black_box(buffer.drain_all()));

        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();
    });
}

/// Encoding cost of one dispatch batch.
fn batch_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_batch");

    for len in [35usize, 350, 3500] {
        let readings = cycle(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("encode", len), &readings, |b, readings| {
            b.iter(|| encode_batch(black_box(readings)));
        });
    }

    group.finish();
}

criterion_group!(benches, append_then_drain, contended_drain, batch_encoding);
criterion_main!(benches);
