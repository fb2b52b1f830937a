use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skyrpc::frame::{Flag, Frame, Sid};
use skyrpc::rpc::flight::Flight;
use skyrpc::rpc::value::{marshal, unmarshal};
use std::time::Duration;

fn sample_flight() -> Flight {
    Flight {
        id: 5653,
        source: "Singapore".to_string(),
        destination: "Tokyo".to_string(),
        airfare: 320.5,
        seat_availability: 42,
        timestamp: 1_735_689_600,
    }
}

fn bench_frame_encode(c: &mut Criterion) {
    let sid = Sid::new();
    let mut group = c.benchmark_group("frame_encode");
    group.measurement_time(Duration::from_secs(10));

    for size in [0usize, 64, 1475] {
        let frame = Frame::new(Flag::Psh, 1, sid, 0, Bytes::from(vec![0u8; size]));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| {
                let mut buf = BytesMut::with_capacity(32 + size);
                black_box(frame).encode(&mut buf);
                buf
            })
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let sid = Sid::new();
    let mut group = c.benchmark_group("frame_decode");
    group.measurement_time(Duration::from_secs(10));

    for size in [0usize, 64, 1475] {
        let frame = Frame::new(Flag::Psh, 1, sid, 0, Bytes::from(vec![0u8; size]));
        let bytes = frame.to_bytes();
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| Frame::decode(black_box(bytes.as_ref())).unwrap())
        });
    }

    group.finish();
}

fn bench_frame_roundtrip(c: &mut Criterion) {
    let sid = Sid::new();
    let frame = Frame::new(Flag::Psh, 7, sid, 3, Bytes::from_static(b"hello, world"));

    let mut group = c.benchmark_group("frame_roundtrip");
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("psh_frame", |b| {
        b.iter(|| {
            let bytes = black_box(&frame).to_bytes();
            Frame::decode(&bytes).unwrap()
        })
    });
    group.finish();
}

fn bench_value_codec(c: &mut Criterion) {
    let flight = sample_flight();
    let encoded = marshal(&flight);

    let mut group = c.benchmark_group("value_codec");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("marshal_flight", |b| b.iter(|| marshal(black_box(&flight))));

    group.bench_function("unmarshal_flight", |b| {
        b.iter(|| unmarshal::<Flight>(black_box(&encoded)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_frame_roundtrip,
    bench_value_codec
);
criterion_main!(benches);
