//! Integration tests for TCP frame decoding
//!
//! These tests validate the frame codec's buffering behaviour: zero-copy splitting,
//! partial frames left untouched, and envelopes reassembled from byte-at-a-time input.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use bitswarm_client::core::codec::{EnvelopeCodec, FrameCodec};
use bitswarm_client::core::container::{ValueList, ValueMap};
use bitswarm_client::core::packet::{Frame, FrameFlags};
use bitswarm_client::protocol::message::{actions, Envelope, Target};
use bitswarm_client::transport::{tcp, Inbound};
use bitswarm_client::utils::crypto::CipherSlot;
use bitswarm_client::utils::metrics::Metrics;
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};

fn player() -> ValueMap {
    ValueMap::new()
        .with("name", "p1")
        .unwrap()
        .with("score", 42i32)
        .unwrap()
        .with("tags", ValueList::new().with("a").unwrap().with("b").unwrap())
        .unwrap()
}

fn player_frame_bytes() -> Vec<u8> {
    let envelope = Envelope::extension(actions::CALL_EXTENSION, player());
    let frame = Frame::new(FrameFlags::empty(), envelope.to_bytes().unwrap());
    let bytes = frame.to_bytes();
    // flags = 0, 2-byte big-endian length
    assert_eq!(bytes[0], 0x00);
    assert_eq!(
        usize::from(u16::from_be_bytes([bytes[1], bytes[2]])),
        bytes.len() - 3
    );
    bytes
}

fn envelope_codec() -> EnvelopeCodec {
    EnvelopeCodec::new(64 * 1024, Arc::new(CipherSlot::new()))
}

#[test]
fn test_decode_zero_copy_split() {
    let mut codec = FrameCodec::default();
    let frame = Frame::new(FrameFlags::empty(), Bytes::from_static(&[1, 2, 3, 4, 5]));

    let mut buffer = BytesMut::from(&frame.to_bytes()[..]);
    buffer.extend_from_slice(&[0x00, 0x00]); // start of the next header
    let original_capacity = buffer.capacity();

    let decoded = codec.decode(&mut buffer).expect("decode").expect("frame");
    assert_eq!(decoded.payload.as_ref(), &[1, 2, 3, 4, 5]);

    // Only the next header's bytes remain; nothing was reallocated
    assert_eq!(buffer.as_ref(), &[0x00, 0x00]);
    assert!(buffer.capacity() <= original_capacity);
}

#[test]
fn test_partial_decode_preserves_buffer() {
    let mut codec = FrameCodec::default();

    // Header announces 16 bytes, only 4 have arrived
    let mut buffer = BytesMut::from(&[0x00, 0x00, 0x10, 1, 2, 3, 4][..]);
    assert!(codec.decode(&mut buffer).expect("no error").is_none());
    assert_eq!(buffer.len(), 7);
}

#[test]
fn test_extended_header_roundtrip() {
    let mut codec = FrameCodec::new(256 * 1024);
    let payload = vec![0x5A; 70_000];
    let frame = Frame::new(FrameFlags::empty(), payload.clone());
    assert!(frame.flags.contains(FrameFlags::EXTENDED));

    let mut buffer = BytesMut::new();
    codec.encode(frame, &mut buffer).unwrap();
    assert_eq!(buffer[0], FrameFlags::EXTENDED.bits());
    assert_eq!(&buffer[1..5], &70_000u32.to_be_bytes());

    let decoded = codec.decode(&mut buffer).unwrap().unwrap();
    assert_eq!(decoded.payload.len(), payload.len());
    assert!(buffer.is_empty());
}

#[test]
fn test_small_payload_in_extended_header_is_accepted() {
    let mut codec = FrameCodec::default();
    let mut buffer = BytesMut::from(&[0x02, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB][..]);
    let frame = codec.decode(&mut buffer).unwrap().unwrap();
    assert_eq!(frame.payload.as_ref(), &[0xAA, 0xBB]);
}

#[test]
fn test_byte_at_a_time_yields_exactly_one_envelope() {
    let mut codec = envelope_codec();
    let mut buffer = BytesMut::new();
    let mut produced = Vec::new();

    for byte in player_frame_bytes() {
        buffer.extend_from_slice(&[byte]);
        while let Some(item) = codec.decode(&mut buffer).expect("stream stays healthy") {
            produced.push(item.expect("well-formed container"));
        }
    }

    assert_eq!(produced.len(), 1);
    let envelope = &produced[0];
    assert_eq!(envelope.target, Target::Extension);
    assert_eq!(envelope.action, actions::CALL_EXTENSION);
    assert_eq!(envelope.payload, player());
    assert!(buffer.is_empty());
}

#[test]
fn test_back_to_back_frames_keep_stream_order() {
    let mut codec = envelope_codec();
    let mut buffer = BytesMut::new();
    for action in [10u16, 11, 12] {
        codec
            .encode(Envelope::extension(action, ValueMap::new()), &mut buffer)
            .unwrap();
    }

    let mut actions_seen = Vec::new();
    while let Some(item) = codec.decode(&mut buffer).unwrap() {
        actions_seen.push(item.unwrap().action);
    }
    assert_eq!(actions_seen, vec![10, 11, 12]);
}

#[tokio::test]
async fn test_read_loop_reassembles_trickled_bytes() {
    let (mut server, client) = tokio::io::duplex(8);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let metrics = Arc::new(Metrics::new());
    tcp::spawn_reader(client, envelope_codec(), tx, metrics.clone());

    for byte in player_frame_bytes() {
        server.write_all(&[byte]).await.unwrap();
        server.flush().await.unwrap();
    }

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("envelope in time");
    match first {
        Some(Inbound::Tcp(envelope)) => assert_eq!(envelope.payload, player()),
        other => panic!("unexpected: {other:?}"),
    }

    // Nothing else was produced from those bytes
    drop(server);
    assert!(matches!(rx.recv().await, Some(Inbound::Closed(_))));
    assert_eq!(metrics.snapshot().frames_received, 1);
}

#[tokio::test]
async fn test_read_loop_skips_malformed_container() {
    let (mut server, client) = tokio::io::duplex(1024);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let metrics = Arc::new(Metrics::new());
    tcp::spawn_reader(client, envelope_codec(), tx, metrics.clone());

    // A well-framed payload that is not a container, then a valid envelope
    let junk = Frame::new(FrameFlags::empty(), Bytes::from_static(&[0x42, 0x00]));
    server.write_all(&junk.to_bytes()).await.unwrap();
    server.write_all(&player_frame_bytes()).await.unwrap();

    match rx.recv().await {
        Some(Inbound::Tcp(envelope)) => assert_eq!(envelope.payload, player()),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(metrics.snapshot().codec_errors, 1);
}
