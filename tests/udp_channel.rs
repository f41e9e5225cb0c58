//! Integration tests for the UDP channel over loopback sockets
//!
//! A plain `UdpSocket` plays the server and injects datagrams in whatever order the test
//! needs, including duplicates and stale sequence numbers.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bitswarm_client::core::container::ValueMap;
use bitswarm_client::core::datagram::{encode_datagram, Datagram};
use bitswarm_client::protocol::message::{actions, ChannelHint, Envelope};
use bitswarm_client::transport::udp::{self, UdpChannel};
use bitswarm_client::transport::Inbound;
use bitswarm_client::utils::metrics::Metrics;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const SESSION: u64 = 0xB175_0001;

async fn setup() -> (UdpSocket, Arc<UdpChannel>, SocketAddr, Arc<Metrics>) {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let metrics = Arc::new(Metrics::new());
    let channel = UdpChannel::bind(
        &server.local_addr().unwrap().to_string(),
        Some(SESSION),
        metrics.clone(),
    )
    .await
    .unwrap();
    // The channel binds the wildcard address; reach it over loopback
    let port = channel.local_addr().unwrap().port();
    let client_addr = SocketAddr::from(([127, 0, 0, 1], port));
    (server, Arc::new(channel), client_addr, metrics)
}

fn update(seq_marker: i32) -> Envelope {
    Envelope::extension(
        actions::CALL_EXTENSION,
        ValueMap::new().with("n", seq_marker).unwrap(),
    )
}

async fn inject(server: &UdpSocket, to: SocketAddr, sequence: u32) {
    let bytes = encode_datagram(SESSION, sequence, &update(sequence as i32)).unwrap();
    server.send_to(&bytes, to).await.unwrap();
}

async fn next(channel: &UdpChannel) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), channel.recv())
        .await
        .expect("datagram in time")
        .expect("accepted datagram")
}

#[tokio::test]
async fn duplicates_and_reordered_datagrams_are_dropped() {
    let (server, channel, to, metrics) = setup().await;

    // 1, 3, 3 (duplicate), 2 (out of order), 4
    for sequence in [1, 3, 3, 2, 4] {
        inject(&server, to, sequence).await;
    }

    let mut accepted = Vec::new();
    for _ in 0..3 {
        let envelope = next(&channel).await;
        assert_eq!(envelope.channel, ChannelHint::UdpEligible);
        accepted.push(envelope.sequence.unwrap());
    }
    assert_eq!(accepted, vec![1, 3, 4]);
    assert_eq!(metrics.snapshot().datagrams_dropped, 2);
    assert_eq!(metrics.snapshot().datagrams_received, 3);
}

#[tokio::test]
async fn later_in_order_datagrams_survive_a_gap() {
    let (server, channel, to, _metrics) = setup().await;

    for sequence in [5, 9] {
        inject(&server, to, sequence).await;
    }
    assert_eq!(next(&channel).await.sequence, Some(5));
    assert_eq!(next(&channel).await.sequence, Some(9));

    inject(&server, to, 10).await;
    assert_eq!(next(&channel).await.payload.get_int("n"), Some(10));
}

#[tokio::test]
async fn short_and_garbage_datagrams_are_dropped() {
    let (server, channel, to, metrics) = setup().await;

    server.send_to(&[1, 2, 3], to).await.unwrap();
    let mut garbage = SESSION.to_be_bytes().to_vec();
    garbage.extend_from_slice(&1u32.to_be_bytes());
    garbage.extend_from_slice(&[0xFF, 0xFF]);
    server.send_to(&garbage, to).await.unwrap();
    inject(&server, to, 2).await;

    assert_eq!(next(&channel).await.sequence, Some(2));
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.datagrams_dropped, 2);
    assert_eq!(snapshot.codec_errors, 1);
}

#[tokio::test]
async fn outgoing_datagrams_carry_session_and_increasing_sequence() {
    let (server, channel, _to, metrics) = setup().await;

    for _ in 0..3 {
        channel.send(&update(0)).unwrap();
    }

    let mut buf = [0u8; 1024];
    let mut sequences = Vec::new();
    for _ in 0..3 {
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let datagram = Datagram::parse(&buf[..len]).unwrap();
        assert_eq!(datagram.session_id, SESSION);
        sequences.push(datagram.sequence);
    }
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(metrics.snapshot().datagrams_sent, 3);
}

#[tokio::test]
async fn read_loop_feeds_inbound_queue_until_closed() {
    let (server, channel, to, _metrics) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = udp::spawn_reader(channel.clone(), tx);

    inject(&server, to, 1).await;
    inject(&server, to, 1).await;
    inject(&server, to, 2).await;

    for expected in [1, 2] {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap() {
            Some(Inbound::Udp(envelope)) => assert_eq!(envelope.sequence, Some(expected)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    channel.close();
    task.abort();
    assert!(channel.try_receive().unwrap().is_none());
}

#[tokio::test]
async fn try_receive_is_non_blocking() {
    let (server, channel, to, _metrics) = setup().await;
    assert!(channel.try_receive().unwrap().is_none());

    inject(&server, to, 1).await;
    let mut received = None;
    for _ in 0..50 {
        if let Some(envelope) = channel.try_receive().unwrap() {
            received = Some(envelope);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(received.expect("datagram arrives").sequence, Some(1));
}
