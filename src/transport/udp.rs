//! # UDP Channel
//!
//! Best-effort datagram side channel. Every datagram carries the session id assigned over
//! TCP and a sequence number; the receiver keeps the highest sequence accepted per peer and
//! drops anything at or below it. Drops are logged and counted, never escalated, and gaps
//! are never retried.

use std::collections::HashMap;
use std::hash::Hash;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use crate::core::datagram::{encode_datagram, Datagram, MAX_DATAGRAM_SIZE};
use crate::error::{constants, BitswarmError, DisconnectReason, FrameError, Result};
use crate::protocol::message::{ChannelHint, Envelope};
use crate::transport::Inbound;
use crate::utils::metrics::Metrics;

const RECV_BUFFER_SIZE: usize = MAX_DATAGRAM_SIZE + 1;

/// Tracks the highest accepted sequence number per peer.
#[derive(Debug)]
pub struct SequenceFilter<K> {
    last_accepted: HashMap<K, u32>,
}

impl<K: Eq + Hash> SequenceFilter<K> {
    pub fn new() -> Self {
        Self {
            last_accepted: HashMap::new(),
        }
    }

    /// Accept `sequence` only if it is strictly greater than the last one accepted from `peer`.
    pub fn accept(&mut self, peer: K, sequence: u32) -> bool {
        match self.last_accepted.get_mut(&peer) {
            Some(last) if sequence <= *last => false,
            Some(last) => {
                *last = sequence;
                true
            }
            None => {
                self.last_accepted.insert(peer, sequence);
                true
            }
        }
    }

    pub fn last_accepted(&self, peer: &K) -> Option<u32> {
        self.last_accepted.get(peer).copied()
    }

    pub fn reset(&mut self) {
        self.last_accepted.clear();
    }
}

impl<K: Eq + Hash> Default for SequenceFilter<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The client's UDP socket, bound to one server and one session.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
    server: SocketAddr,
    session_id: u64,
    next_sequence: AtomicU32,
    filter: Mutex<SequenceFilter<SocketAddr>>,
    metrics: Arc<Metrics>,
    closed: AtomicBool,
}

impl UdpChannel {
    /// Bind a local socket for talking to `server`.
    ///
    /// Requires the session id from the TCP handshake; UDP never runs without one.
    #[instrument(skip(metrics))]
    pub async fn bind(server: &str, session_id: Option<u64>, metrics: Arc<Metrics>) -> Result<Self> {
        let session_id =
            session_id.ok_or(BitswarmError::SessionUnavailable(constants::ERR_NO_SESSION_ID))?;

        let server = tokio::net::lookup_host(server).await?.next().ok_or_else(|| {
            BitswarmError::Io(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {server}"),
            ))
        })?;
        let local: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        debug!(local = %socket.local_addr()?, %server, session_id, "UDP channel bound");

        Ok(Self::from_socket(socket, server, session_id, metrics))
    }

    /// Wrap an already bound socket
    pub fn from_socket(
        socket: UdpSocket,
        server: SocketAddr,
        session_id: u64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            socket,
            server,
            session_id,
            next_sequence: AtomicU32::new(1),
            filter: Mutex::new(SequenceFilter::new()),
            metrics,
            closed: AtomicBool::new(false),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Send one envelope without waiting for socket readiness.
    ///
    /// Returns the sequence number used. A full socket buffer drops the datagram, which is
    /// logged and counted like any other UDP loss.
    pub fn send(&self, envelope: &Envelope) -> Result<u32> {
        if self.is_closed() {
            return Err(BitswarmError::NotConnected);
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let datagram = encode_datagram(self.session_id, sequence, envelope)?;
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(FrameError::TooLarge {
                size: datagram.len(),
                max: MAX_DATAGRAM_SIZE,
            }
            .into());
        }

        match self.socket.try_send_to(&datagram, self.server) {
            Ok(written) => {
                trace!(sequence, bytes = written, "Datagram sent");
                self.metrics.datagram_sent(written as u64);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!(sequence, "UDP send buffer full, datagram dropped");
                self.metrics.datagram_dropped();
            }
            Err(e) => return Err(e.into()),
        }
        Ok(sequence)
    }

    /// Next accepted envelope, if one is already waiting on the socket.
    pub fn try_receive(&self) -> Result<Option<Envelope>> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, peer)) => {
                    if let Some(envelope) = self.accept(&buf[..len], peer)? {
                        return Ok(Some(envelope));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wait for the next accepted envelope; dropped datagrams are skipped.
    pub async fn recv(&self) -> Result<Envelope> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            if self.is_closed() {
                return Err(BitswarmError::NotConnected);
            }
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            if let Some(envelope) = self.accept(&buf[..len], peer)? {
                return Ok(envelope);
            }
        }
    }

    /// Stop sending and receiving; the socket is released when the channel is dropped
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(session_id = self.session_id, "UDP channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Validate one raw datagram. `Ok(None)` means it was dropped.
    fn accept(&self, raw: &[u8], peer: SocketAddr) -> Result<Option<Envelope>> {
        let datagram = match Datagram::parse(raw) {
            Ok(d) => d,
            Err(e) => {
                warn!(%peer, error = %e, "Dropping malformed datagram");
                self.metrics.datagram_dropped();
                return Ok(None);
            }
        };

        if datagram.session_id != self.session_id {
            debug!(%peer, got = datagram.session_id, "Dropping datagram for another session");
            self.metrics.datagram_dropped();
            return Ok(None);
        }

        let mut envelope = match datagram.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%peer, sequence = datagram.sequence, error = %e, "Dropping undecodable datagram");
                self.metrics.codec_error();
                self.metrics.datagram_dropped();
                return Ok(None);
            }
        };

        let fresh = self
            .filter
            .lock()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_SESSION_LOCK))?
            .accept(peer, datagram.sequence);
        if !fresh {
            debug!(%peer, sequence = datagram.sequence, "Dropping stale or duplicate datagram");
            self.metrics.datagram_dropped();
            return Ok(None);
        }

        self.metrics.datagram_received(raw.len() as u64);
        envelope.sequence = Some(datagram.sequence);
        envelope.channel = ChannelHint::UdpEligible;
        Ok(Some(envelope))
    }
}

/// Spawn the UDP read loop, pushing accepted envelopes into the connection's queue.
///
/// Socket errors end the loop without closing the connection; a poisoned filter lock does.
pub fn spawn_reader(channel: Arc<UdpChannel>, inbound: mpsc::UnboundedSender<Inbound>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match channel.recv().await {
                Ok(envelope) => {
                    if inbound.send(Inbound::Udp(envelope)).is_err() {
                        break;
                    }
                }
                Err(BitswarmError::NotConnected) => break,
                Err(e @ BitswarmError::LockPoisoned(_)) => {
                    error!(error = %e, "UDP sequence state corrupted");
                    let _ = inbound.send(Inbound::Closed(DisconnectReason::ProtocolViolation));
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "UDP read loop stopped");
                    break;
                }
            }
        }
        debug!(session_id = channel.session_id(), "UDP read loop finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::ValueMap;
    use crate::protocol::message::actions;

    #[test]
    fn filter_accepts_strictly_increasing() {
        let mut filter = SequenceFilter::new();
        assert!(filter.accept("a", 1));
        assert!(filter.accept("a", 3));
        assert!(!filter.accept("a", 3));
        assert!(!filter.accept("a", 2));
        assert!(filter.accept("a", 4));
        assert_eq!(filter.last_accepted(&"a"), Some(4));
    }

    #[test]
    fn filter_tracks_peers_independently() {
        let mut filter = SequenceFilter::new();
        assert!(filter.accept(1u8, 10));
        assert!(filter.accept(2u8, 1));
        assert!(!filter.accept(1u8, 5));
        filter.reset();
        assert!(filter.accept(1u8, 5));
    }

    #[tokio::test]
    async fn bind_requires_session_id() {
        let result = UdpChannel::bind("127.0.0.1:9", None, Arc::new(Metrics::new())).await;
        assert!(matches!(result, Err(BitswarmError::SessionUnavailable(_))));
    }

    async fn loopback_pair(session_id: u64) -> (UdpSocket, UdpChannel) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel =
            UdpChannel::from_socket(socket, server.local_addr().unwrap(), session_id, Arc::new(Metrics::new()));
        (server, channel)
    }

    #[tokio::test]
    async fn send_numbers_datagrams_from_one() {
        let (server, channel) = loopback_pair(77).await;
        let envelope = Envelope::extension(actions::CALL_EXTENSION, ValueMap::new());
        assert_eq!(channel.send(&envelope).unwrap(), 1);
        assert_eq!(channel.send(&envelope).unwrap(), 2);

        let mut buf = [0u8; 512];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let datagram = Datagram::parse(&buf[..len]).unwrap();
        assert_eq!(datagram.session_id, 77);
        assert_eq!(datagram.sequence, 1);
        assert_eq!(datagram.envelope().unwrap().action, actions::CALL_EXTENSION);
    }

    #[tokio::test]
    async fn foreign_session_is_dropped() {
        let (server, channel) = loopback_pair(5).await;
        let local = channel.local_addr().unwrap();
        let envelope = Envelope::extension(actions::CALL_EXTENSION, ValueMap::new());

        server.send_to(&encode_datagram(6, 1, &envelope).unwrap(), local).await.unwrap();
        server.send_to(&encode_datagram(5, 1, &envelope).unwrap(), local).await.unwrap();

        let received = channel.recv().await.unwrap();
        assert_eq!(received.sequence, Some(1));
        assert_eq!(channel.metrics.snapshot().datagrams_dropped, 1);
    }

    #[tokio::test]
    async fn closed_channel_refuses_io() {
        let (_server, channel) = loopback_pair(1).await;
        channel.close();
        let envelope = Envelope::extension(actions::CALL_EXTENSION, ValueMap::new());
        assert!(matches!(channel.send(&envelope), Err(BitswarmError::NotConnected)));
        assert!(channel.try_receive().unwrap().is_none());
    }
}
