//! Benchmarks for FrameOfData decoding
//!
//! Measures:
//! - Full datagram decode per protocol version (header, sections, suffix)
//! - Scaling with the number of rigid bodies in a frame
//!
//! Platform: Cross-platform (synthetic frames from test_utils, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use natnet::protocol::{Message, decode, encode};
use natnet::test_utils::sample_frame;
use natnet::{ProtocolVersion, RigidBody};
use std::hint::black_box;

fn frame_datagram(version: ProtocolVersion, rigid_bodies: usize) -> Vec<u8> {
    let mut frame = sample_frame(1, version);
    let template: RigidBody = frame.rigid_bodies[0].clone();
    frame.rigid_bodies = (0..rigid_bodies)
        .map(|i| RigidBody { id: i as i32 + 1, ..template.clone() })
        .collect();
    encode(&Message::FrameOfData(frame), version).expect("Failed to encode frame")
}

fn bench_versions(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_by_version");

    for version in [ProtocolVersion::new(2, 9), ProtocolVersion::new(3, 1), ProtocolVersion::new(4, 1)] {
        let datagram = frame_datagram(version, 8);
        group.throughput(Throughput::Bytes(datagram.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(version), &datagram, |b, datagram| {
            b.iter(|| black_box(decode(black_box(datagram), version).unwrap()))
        });
    }

    group.finish();
}

fn bench_rigid_body_count(c: &mut Criterion) {
    let version = ProtocolVersion::LATEST;
    let mut group = c.benchmark_group("decode_by_rigid_bodies");

    for count in [1, 16, 64, 256] {
        let datagram = frame_datagram(version, count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &datagram, |b, datagram| {
            b.iter(|| black_box(decode(black_box(datagram), version).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_versions, bench_rigid_body_count);
criterion_main!(benches);
