//! Benchmarks for per-sample cost
//!
//! Compares offset-indexed sampling of a few subscribed labels against a full
//! reading-table scan, across segment sizes. Sampling cost should stay flat as
//! the table grows; the scan grows linearly.
//!
//! Platform: Cross-platform (synthetic in-memory segments, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sensortap::test_utils::SegmentBuilder;
use sensortap::types::{Label, ReadingType};
use sensortap::{SharedMemorySource, TelemetrySource};
use std::hint::black_box;

const TABLE_SIZES: [usize; 3] = [64, 512, 4096];

fn build_segment(readings: usize) -> sensortap::MemorySegment {
    let mut builder = SegmentBuilder::new().sensor("CPU [#0]", "").sensor("GPU [#0]", "");
    for i in 0..readings {
        builder = builder.reading(ReadingType::Other, (i % 2) as u32, &format!("Reading {i}"), "", "", i as f64);
    }
    builder.build_segment()
}

fn subscribed(readings: usize) -> Vec<Label> {
    [0, readings / 2, readings - 1].iter().map(|i| Label::new(format!("Reading {i}"))).collect()
}

fn bench_subscribed_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscribed_sample");

    for readings in TABLE_SIZES {
        let mut source = SharedMemorySource::new(build_segment(readings));
        source.open().expect("open synthetic segment");
        source.resolve(&subscribed(readings)).expect("resolve labels");

        group.throughput(Throughput::Elements(3));
        group.bench_with_input(BenchmarkId::from_parameter(readings), &readings, |b, _| {
            b.iter(|| black_box(source.sample().expect("sample")))
        });
    }

    group.finish();
}

fn bench_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_table_scan");

    for readings in TABLE_SIZES {
        let mut source = SharedMemorySource::new(build_segment(readings));
        source.open().expect("open synthetic segment");

        group.throughput(Throughput::Elements(readings as u64));
        group.bench_with_input(BenchmarkId::from_parameter(readings), &readings, |b, _| {
            b.iter(|| black_box(source.read_all().expect("read all")))
        });
    }

    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let segment = build_segment(1024);

    c.bench_function("open_and_index_1024", |b| {
        b.iter(|| {
            let mut source = SharedMemorySource::new(segment.clone());
            source.open().expect("open synthetic segment");
            black_box(source.index().map(|index| index.len()))
        })
    });
}

criterion_group!(benches, bench_subscribed_sample, bench_full_scan, bench_open);
criterion_main!(benches);
