//! Frame parse and classify benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowcast_core::fixture::FrameBuilder;
use flowcast_core::{
    BandwidthAllocator, ParsedPacket, PredictionResult, TrafficCategory, TrafficClassifier,
};

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for size in [64usize, 512, 1500] {
        let frame = FrameBuilder::tcp([192, 168, 1, 10], [10, 0, 0, 1], 51234, 443)
            .frame_size(size)
            .build();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| ParsedPacket::parse(black_box(frame)))
        });
    }
    group.finish();
}

fn bench_parse_classify(c: &mut Criterion) {
    let classifier = TrafficClassifier::new();
    let frames = [
        FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 5004).build(),
        FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 40001).build(),
        FrameBuilder::udp([8, 8, 8, 8], [10, 0, 0, 2], 53, 40000).build(),
    ];

    c.bench_function("parse_classify_mix", |b| {
        b.iter(|| {
            for frame in &frames {
                if let Ok(packet) = ParsedPacket::parse(black_box(frame)) {
                    black_box(classifier.classify(&packet));
                }
            }
        })
    });
}

fn bench_allocate(c: &mut Criterion) {
    let allocator = BandwidthAllocator::new();
    let predictions: Vec<_> = TrafficCategory::ALL
        .iter()
        .map(|c| PredictionResult::new(*c, 7.5))
        .collect();

    c.bench_function("allocate_5", |b| {
        b.iter(|| allocator.allocate(black_box(&predictions), black_box(25.0)))
    });
}

criterion_group!(benches, bench_parse, bench_parse_classify, bench_allocate);
criterion_main!(benches);
