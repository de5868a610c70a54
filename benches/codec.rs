//! Frame codec throughput

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tokio_util::codec::{Decoder, Encoder};

use mstp_link::protocol::crc::{data_crc, header_crc};
use mstp_link::protocol::{Frame, FrameCodec};

fn payload(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0x55FF);
    (0..len).map(|_| rng.gen()).collect()
}

fn bench_crc(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc");
    let header = [0x05, 0x10, 0x03, 0x01, 0xF5];
    group.bench_function("header", |b| b.iter(|| header_crc(black_box(&header))));

    let data = payload(501);
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("data_501", |b| b.iter(|| data_crc(black_box(&data))));
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for len in [0usize, 32, 128, 501] {
        let frame = Frame::data(0x10, 0x03, payload(len), false);
        let mut wire = BytesMut::new();
        FrameCodec::new().encode(&frame, &mut wire).unwrap();
        let wire = wire.freeze();

        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_with_input(BenchmarkId::new("frame", len), &wire, |b, wire| {
            let mut codec = FrameCodec::new();
            b.iter(|| {
                let mut buf = BytesMut::from(&wire[..]);
                black_box(codec.decode(&mut buf).unwrap())
            })
        });
    }

    let mut noisy = payload(256);
    noisy.retain(|&octet| octet != 0x55);
    let mut token = BytesMut::new();
    FrameCodec::new().encode(&Frame::token(4, 3), &mut token).unwrap();
    noisy.extend_from_slice(&token);
    group.bench_function("resync_after_noise", |b| {
        let mut codec = FrameCodec::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&noisy[..]);
            black_box(codec.decode(&mut buf).unwrap())
        })
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let frame = Frame::data(0x10, 0x03, payload(501), true);
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::with_capacity(512);
    c.bench_function("encode_501", |b| {
        b.iter(|| {
            buf.clear();
            codec.encode(black_box(&frame), &mut buf).unwrap();
        })
    });
}

criterion_group!(benches, bench_crc, bench_decode, bench_encode);
criterion_main!(benches);
