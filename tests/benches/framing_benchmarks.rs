//! # Framing Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Encode one tool command | < 10µs |
//! | Decode a coalesced read of 64 envelopes | < 1ms |
//! | Reassemble one envelope split into 16-byte reads | < 100µs |

use bridge_engine::transport::{encode, EnvelopeFramer};
use bridge_types::{Envelope, ManageGameObject, ToolCommand};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const MAX_FRAME: usize = 4 * 1024 * 1024;

fn sample_envelope(n: usize) -> Envelope {
    let command = ManageGameObject {
        action: "modify".into(),
        target: Some(format!("Enemy_{n}")),
        position: Some(vec![1.0, 2.5, -3.0]),
        components_to_add: Some(vec!["Rigidbody".into(), "BoxCollider".into()]),
        ..Default::default()
    };
    let mut envelope = command.to_envelope().expect("serializable command");
    envelope.ensure_id();
    envelope
}

fn bench_encode(c: &mut Criterion) {
    let envelope = sample_envelope(0);
    c.bench_function("framer/encode", |b| {
        b.iter(|| encode(black_box(&envelope), MAX_FRAME).expect("fits"))
    });
}

fn bench_decode_coalesced(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer/decode_coalesced");
    for count in [1usize, 16, 64] {
        let bytes: Vec<u8> = (0..count)
            .flat_map(|n| encode(&sample_envelope(n), MAX_FRAME).expect("fits"))
            .collect();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bytes, |b, bytes| {
            b.iter(|| {
                let mut framer = EnvelopeFramer::new(MAX_FRAME);
                let decoded = framer.decode(black_box(bytes)).expect("valid frames");
                assert_eq!(decoded.len(), count);
            })
        });
    }
    group.finish();
}

fn bench_reassemble_split(c: &mut Criterion) {
    let bytes = encode(&sample_envelope(0), MAX_FRAME).expect("fits");
    c.bench_function("framer/reassemble_16b_reads", |b| {
        b.iter(|| {
            let mut framer = EnvelopeFramer::new(MAX_FRAME);
            let mut decoded = 0;
            for chunk in bytes.chunks(16) {
                decoded += framer.decode(black_box(chunk)).expect("valid frames").len();
            }
            assert_eq!(decoded, 1);
        })
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode_coalesced,
    bench_reassemble_split
);
criterion_main!(benches);
