use std::sync::Arc;

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use bitswarm_client::core::codec::EnvelopeCodec;
use bitswarm_client::core::container::ValueMap;
use bitswarm_client::protocol::message::{actions, Envelope};
use bitswarm_client::utils::crypto::{CipherSlot, XChaChaCipher};
use tokio_util::codec::{Decoder, Encoder};

const MAX_FRAME: usize = 1024 * 1024;

#[allow(clippy::unwrap_used)]
fn envelope(size: usize) -> Envelope {
    // Repetitive text so the compression path is actually taken
    let text = "abcd".repeat(size / 4);
    Envelope::extension(
        actions::CALL_EXTENSION,
        ValueMap::new().with("blob", text.as_str()).unwrap(),
    )
}

#[allow(clippy::unwrap_used)]
fn codecs() -> Vec<(&'static str, EnvelopeCodec)> {
    let plain = EnvelopeCodec::new(MAX_FRAME, Arc::new(CipherSlot::new()));
    let compressed = EnvelopeCodec::new(MAX_FRAME, Arc::new(CipherSlot::new())).with_compression(1024);

    let slot = Arc::new(CipherSlot::new());
    slot.install(Arc::new(XChaChaCipher), XChaChaCipher::generate_key())
        .unwrap();
    let encrypted = EnvelopeCodec::new(MAX_FRAME, slot).with_compression(1024);

    vec![
        ("plain", plain),
        ("compressed", compressed),
        ("compressed_encrypted", encrypted),
    ]
}

#[allow(clippy::unwrap_used)]
fn bench_frame_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_roundtrip");

    for &size in &[256usize, 4096, 65536] {
        let message = envelope(size);
        group.throughput(Throughput::Bytes(size as u64));

        for (name, codec) in codecs() {
            group.bench_function(format!("encode_{name}_{size}b"), |b| {
                let mut codec = codec.clone();
                b.iter_batched(
                    || message.clone(),
                    |message| {
                        let mut buf = BytesMut::with_capacity(size + 64);
                        codec.encode(message, &mut buf).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });

            let mut wire = BytesMut::new();
            codec.clone().encode(message.clone(), &mut wire).unwrap();
            group.bench_function(format!("decode_{name}_{size}b"), |b| {
                let mut codec = codec.clone();
                b.iter_batched(
                    || wire.clone(),
                    |mut buf| {
                        let decoded = codec.decode(&mut buf).unwrap();
                        assert!(matches!(decoded, Some(Ok(_))));
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_frame_roundtrip);
criterion_main!(benches);
