//! # Client Connection
//!
//! [`Connection`] ties the pipeline together for one server: it owns the TCP read and write
//! tasks, the optional UDP channel, the session state, the lag monitor and the dispatcher.
//!
//! Socket tasks never call handlers. They push decoded envelopes into a single queue which
//! the application drains from its own update tick with [`Connection::process_events`] (or
//! awaits with [`Connection::wait_events`]). Handlers and event publication therefore always
//! run on the caller's task, in arrival order per channel.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use bitswarm_client::config::ClientConfig;
//! use bitswarm_client::protocol::event::CollectingSink;
//! use bitswarm_client::protocol::requests::{HandshakeRequest, LoginRequest};
//! use bitswarm_client::service::client::Connection;
//!
//! # async fn run() -> bitswarm_client::error::Result<()> {
//! let events = Arc::new(CollectingSink::new());
//! let mut conn = Connection::connect(ClientConfig::default(), events.clone()).await?;
//! conn.send(&HandshakeRequest::default())?;
//! conn.send(&LoginRequest::new("arena", "p1"))?;
//!
//! loop {
//!     conn.process_events(Instant::now())?;
//!     for event in events.drain() {
//!         println!("{event:?}");
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::codec::EnvelopeCodec;
use crate::core::packet::{Frame, FrameFlags};
use crate::error::{constants, BitswarmError, DisconnectReason, FrameError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::event::{Event, EventSink};
use crate::protocol::lag::{LagAction, LagMonitor, LagState};
use crate::protocol::message::{ChannelHint, Envelope};
use crate::protocol::requests::{Request, UdpInitRequest};
use crate::transport::session::{Session, SessionInfo};
use crate::transport::udp::{self, UdpChannel};
use crate::transport::{tcp, Inbound};
use crate::utils::crypto::{Cipher, SessionKey};
use crate::utils::metrics::{Metrics, Timer};

/// One live connection to a Bitswarm server.
pub struct Connection {
    config: ClientConfig,
    session: Arc<Session>,
    dispatcher: Dispatcher,
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    codec: EnvelopeCodec,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    lag: LagMonitor,
    udp: Option<Arc<UdpChannel>>,
    tcp_reader: Option<JoinHandle<()>>,
    tcp_writer: Option<JoinHandle<()>>,
    udp_reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl Connection {
    /// Connect the control channel to `config.tcp_addr()`.
    ///
    /// Nothing is sent yet; the application starts with a [`HandshakeRequest`].
    ///
    /// [`HandshakeRequest`]: crate::protocol::requests::HandshakeRequest
    #[instrument(skip(config, sink), fields(addr = %config.tcp_addr()))]
    pub async fn connect(config: ClientConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        check_config(&config)?;
        let stream = tcp::connect(&config.tcp_addr(), config.connect_timeout).await?;
        Self::from_stream(stream, config, sink)
    }

    /// Build a connection over an already established byte stream.
    ///
    /// Must be called from within a Tokio runtime; the I/O tasks are spawned immediately.
    pub fn from_stream<S>(stream: S, config: ClientConfig, sink: Arc<dyn EventSink>) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        check_config(&config)?;

        let session = Arc::new(Session::new());
        let connection_id = session.connection_id()?;
        let dispatcher = Dispatcher::with_defaults()?;
        let metrics = Arc::new(Metrics::new());
        let codec = EnvelopeCodec::new(config.max_frame_size, session.cipher())
            .with_compression(config.compression_threshold);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (reader, writer) = tokio::io::split(stream);

        let tcp_reader = tcp::spawn_reader(
            reader,
            codec.clone(),
            inbound_tx.clone(),
            Arc::clone(&metrics),
        );
        let tcp_writer = tcp::spawn_writer(
            writer,
            codec.frame_codec(),
            outbound_rx,
            inbound_tx.clone(),
            Arc::clone(&metrics),
        );

        let lag = LagMonitor::from_config(&config, Instant::now());
        info!(connection_id, "Connection ready");

        Ok(Self {
            config,
            session,
            dispatcher,
            sink,
            metrics,
            codec,
            outbound: Some(outbound_tx),
            inbound_tx,
            inbound_rx,
            lag,
            udp: None,
            tcp_reader: Some(tcp_reader),
            tcp_writer: Some(tcp_writer),
            udp_reader: None,
            closed: false,
        })
    }

    /// Routing table; register extra handlers here before draining events.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_connected(&self) -> bool {
        !self.closed
    }

    /// Snapshot of the session state
    pub fn session(&self) -> Result<SessionInfo> {
        self.session.info()
    }

    /// Moving-average round trip time, once at least one pong has arrived
    pub fn rtt(&self) -> Option<Duration> {
        self.lag.average_rtt()
    }

    pub fn lag_state(&self) -> LagState {
        self.lag.state()
    }

    /// Send a request on the channel it asks for.
    ///
    /// UDP-eligible requests use the UDP channel once it is initialized and fall back to TCP
    /// before that.
    pub fn send<R: Request + ?Sized>(&mut self, request: &R) -> Result<()> {
        let envelope = request.to_envelope()?;
        if envelope.channel == ChannelHint::UdpEligible && self.udp.is_some() {
            self.send_udp_envelope(&envelope).map(|_| ())
        } else {
            self.send_envelope(&envelope)
        }
    }

    /// Queue one envelope on the control channel.
    ///
    /// # Errors
    /// `FrameError::TooLarge` if the sealed payload exceeds `max_frame_size`. Nothing is
    /// queued and the connection stays open.
    pub fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        if self.closed {
            return Err(BitswarmError::NotConnected);
        }

        let frame = self.codec.seal(envelope).map_err(|e| self.fail(e))?;
        // Rejected here, before the writer task would fail on it and take the stream down
        if frame.payload.len() > self.config.max_frame_size {
            warn!(
                size = frame.payload.len(),
                max = self.config.max_frame_size,
                action = envelope.action,
                "Outgoing envelope exceeds the frame limit, not sent"
            );
            return Err(FrameError::TooLarge {
                size: frame.payload.len(),
                max: self.config.max_frame_size,
            }
            .into());
        }
        if frame.flags.contains(FrameFlags::COMPRESSED) {
            self.metrics.compression();
        }
        if frame.flags.contains(FrameFlags::ENCRYPTED) {
            self.metrics.encryption();
        }

        let outbound = self.outbound.as_ref().ok_or(BitswarmError::NotConnected)?;
        if outbound.send(frame).is_err() {
            return Err(self.fail(BitswarmError::NotConnected));
        }
        debug!(target_ns = %envelope.target, action = envelope.action, "Envelope queued");
        Ok(())
    }

    /// Send a request over UDP regardless of its channel hint. Returns the sequence used.
    pub fn send_udp<R: Request + ?Sized>(&self, request: &R) -> Result<u32> {
        let envelope = request.to_envelope()?;
        self.send_udp_envelope(&envelope)
    }

    fn send_udp_envelope(&self, envelope: &Envelope) -> Result<u32> {
        if self.closed {
            return Err(BitswarmError::NotConnected);
        }
        let udp = self.udp.as_ref().ok_or(BitswarmError::SessionUnavailable(
            constants::ERR_UDP_NOT_INITIALIZED,
        ))?;
        udp.send(envelope)
    }

    /// Bind the UDP channel and announce it to the server.
    ///
    /// Needs a configured UDP port and the session id from the handshake. The server's
    /// acknowledgement arrives as [`Event::UdpInit`].
    #[instrument(skip(self))]
    pub async fn init_udp(&mut self) -> Result<()> {
        if self.closed {
            return Err(BitswarmError::NotConnected);
        }
        let addr = self
            .config
            .udp_addr()
            .ok_or_else(|| BitswarmError::Config("udp_port is not configured".into()))?;
        let session_id = self.session.session_id()?;

        let channel =
            Arc::new(UdpChannel::bind(&addr, session_id, Arc::clone(&self.metrics)).await?);
        channel.send(&UdpInitRequest.to_envelope()?)?;

        let reader = udp::spawn_reader(Arc::clone(&channel), self.inbound_tx.clone());
        if let Some(previous) = self.udp.replace(channel) {
            previous.close();
        }
        if let Some(previous) = self.udp_reader.replace(reader) {
            previous.abort();
        }
        info!(%addr, "UDP channel initialized");
        Ok(())
    }

    /// Install the session cipher negotiated during the handshake.
    pub fn install_cipher(&self, cipher: Arc<dyn Cipher>, key: SessionKey) -> Result<()> {
        if !self.config.encryption_enabled {
            return Err(BitswarmError::Config(
                "encryption is disabled for this connection".into(),
            ));
        }
        if self.closed {
            return Err(BitswarmError::NotConnected);
        }
        self.session.cipher().install(cipher, key)?;
        info!("Session cipher installed");
        Ok(())
    }

    /// Begin lag probing; the first ping goes out on the next drain.
    pub fn start_lag_monitor(&mut self, now: Instant) {
        self.lag.start(now);
    }

    pub fn stop_lag_monitor(&mut self) {
        self.lag.stop();
    }

    /// Drain everything queued by the read loops, then drive the lag monitor.
    ///
    /// Returns the number of envelopes dispatched. Fatal conditions close the connection and
    /// publish [`Event::Disconnected`]; only errors the caller can act on are returned.
    pub fn process_events(&mut self, now: Instant) -> Result<usize> {
        if self.closed {
            return Ok(0);
        }
        let _timer = Timer::start("process_events");

        let mut dispatched = 0;
        while !self.closed {
            let Ok(item) = self.inbound_rx.try_recv() else {
                break;
            };
            dispatched += self.handle_inbound(item, now)?;
        }

        self.drive_lag(now)?;
        Ok(dispatched)
    }

    /// Wait until something arrives or the next lag probe is due, then drain.
    pub async fn wait_events(&mut self) -> Result<usize> {
        if self.closed {
            return Err(BitswarmError::NotConnected);
        }

        let next = match self.lag.next_probe() {
            Some(due) => tokio::time::timeout_at(
                tokio::time::Instant::from_std(due),
                self.inbound_rx.recv(),
            )
            .await
            .unwrap_or(None),
            None => self.inbound_rx.recv().await,
        };

        let now = Instant::now();
        let mut dispatched = 0;
        if let Some(item) = next {
            dispatched += self.handle_inbound(item, now)?;
        }
        Ok(dispatched + self.process_events(now)?)
    }

    /// Close the connection. Queued outbound frames are still flushed.
    pub fn close(&mut self) {
        self.shutdown(DisconnectReason::Manual);
    }

    fn handle_inbound(&mut self, item: Inbound, now: Instant) -> Result<usize> {
        match item {
            Inbound::Tcp(envelope) | Inbound::Udp(envelope) => {
                self.route(&envelope, now)?;
                Ok(1)
            }
            Inbound::Closed(reason) => {
                self.shutdown(reason);
                Ok(0)
            }
        }
    }

    fn route(&mut self, envelope: &Envelope, now: Instant) -> Result<()> {
        let events = match self.dispatcher.dispatch(envelope) {
            Ok(events) => events,
            Err(BitswarmError::Dispatch(e)) => {
                warn!(
                    target_ns = %envelope.target,
                    action = envelope.action,
                    error = %e,
                    "Dropping undeliverable envelope"
                );
                self.metrics.dispatch_error();
                self.sink.publish(Event::DispatchFailed(e));
                return Ok(());
            }
            Err(e) => return Err(self.fail(e)),
        };

        for event in events {
            if self.closed {
                break;
            }
            self.deliver(event, now)?;
        }
        Ok(())
    }

    fn deliver(&mut self, event: Event, now: Instant) -> Result<()> {
        match event {
            Event::Handshake {
                session_id,
                ref token,
                max_message_size,
            } => {
                let max = usize::try_from(max_message_size).unwrap_or(0);
                self.session
                    .establish(session_id, token.clone(), max)
                    .map_err(|e| self.fail(e))?;
                if max > self.config.max_frame_size {
                    debug!(
                        server = max,
                        local = self.config.max_frame_size,
                        "Server accepts larger messages than the local frame limit"
                    );
                }
                info!(session_id, max_message_size, "Session established");
                self.sink.publish(event);
            }
            Event::PingPong { echoed_ms } => {
                if let Some(rtt) = self.lag.on_pong(echoed_ms, now) {
                    let average = self.lag.average_rtt().unwrap_or(rtt);
                    self.session
                        .record_rtt(rtt, Some(average))
                        .map_err(|e| self.fail(e))?;
                    self.sink.publish(Event::LagUpdate { rtt, average });
                }
            }
            Event::Kicked { reason } => {
                warn!(reason, "Server ended the session");
                self.sink.publish(event);
                self.shutdown(DisconnectReason::Kicked);
            }
            other => self.sink.publish(other),
        }
        Ok(())
    }

    fn drive_lag(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        match self.lag.poll(now) {
            Some(LagAction::SendPing(ping)) => self.send_envelope(&ping),
            Some(LagAction::Timeout) => {
                self.shutdown(DisconnectReason::LagTimeout);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Close the connection if `e` is fatal, handing the error back.
    fn fail(&mut self, e: BitswarmError) -> BitswarmError {
        if let Some(reason) = e.disconnect_reason() {
            error!(error = %e, %reason, "Fatal connection error");
            self.shutdown(reason);
        }
        e
    }

    fn shutdown(&mut self, reason: DisconnectReason) {
        if self.closed {
            return;
        }
        self.closed = true;

        for task in [self.tcp_reader.take(), self.udp_reader.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        if let Some(udp) = self.udp.take() {
            udp.close();
        }
        // Dropping the last sender lets the writer flush and close the socket
        self.outbound = None;
        self.tcp_writer = None;

        self.lag.stop();
        let mut discarded = 0usize;
        while self.inbound_rx.try_recv().is_ok() {
            discarded += 1;
        }
        self.session.release();

        self.metrics.disconnected();
        self.metrics.log_metrics();
        if reason == DisconnectReason::Manual {
            info!(%reason, discarded, "Connection closed");
        } else {
            warn!(%reason, discarded, "Connection closed");
        }
        self.sink.publish(Event::Disconnected { reason });
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown(DisconnectReason::Manual);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.config.tcp_addr())
            .field("closed", &self.closed)
            .field("udp", &self.udp.is_some())
            .field("lag", &self.lag.state())
            .finish()
    }
}

fn check_config(config: &ClientConfig) -> Result<()> {
    let problems = config.validate();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(BitswarmError::Config(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::ValueMap;
    use crate::error::DispatchError;
    use crate::protocol::event::CollectingSink;
    use crate::protocol::message::{actions, Target};
    use crate::utils::crypto::XChaChaCipher;
    use futures::SinkExt;
    use tokio::io::DuplexStream;
    use tokio_util::codec::FramedWrite;

    fn open(config: ClientConfig) -> (Connection, DuplexStream, Arc<CollectingSink>) {
        let (client, server) = tokio::io::duplex(4096);
        let sink = Arc::new(CollectingSink::new());
        let conn = Connection::from_stream(client, config, sink.clone()).unwrap();
        (conn, server, sink)
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let (client, _server) = tokio::io::duplex(64);
        let config = ClientConfig {
            host: String::new(),
            ..ClientConfig::default()
        };
        let result = Connection::from_stream(client, config, Arc::new(CollectingSink::new()));
        assert!(matches!(result, Err(BitswarmError::Config(_))));
    }

    #[tokio::test]
    async fn cipher_requires_encryption_enabled() {
        let (conn, _server, _sink) = open(ClientConfig::default());
        let result = conn.install_cipher(Arc::new(XChaChaCipher), XChaChaCipher::generate_key());
        assert!(matches!(result, Err(BitswarmError::Config(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut conn, _server, sink) = open(ClientConfig::default());
        conn.close();
        conn.close();
        drop(conn);

        let disconnects: Vec<_> = sink
            .drain()
            .into_iter()
            .filter(|e| matches!(e, Event::Disconnected { .. }))
            .collect();
        assert_eq!(
            disconnects,
            vec![Event::Disconnected {
                reason: DisconnectReason::Manual
            }]
        );
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (mut conn, _server, _sink) = open(ClientConfig::default());
        conn.close();
        let envelope = Envelope::system(actions::LOGOUT, ValueMap::new());
        assert!(matches!(
            conn.send_envelope(&envelope),
            Err(BitswarmError::NotConnected)
        ));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn udp_send_requires_init() {
        let (conn, _server, _sink) = open(ClientConfig::default());
        let result = conn.send_udp(&UdpInitRequest);
        assert!(matches!(result, Err(BitswarmError::SessionUnavailable(_))));
    }

    #[tokio::test]
    async fn unknown_target_keeps_connection_open() {
        let (mut conn, server, sink) = open(ClientConfig::default());
        let codec = EnvelopeCodec::new(1024, Arc::new(Default::default()));
        let mut writer = FramedWrite::new(server, codec);
        writer
            .send(Envelope::new(Target::Other(9), 1, ValueMap::new()))
            .await
            .unwrap();

        assert_eq!(conn.wait_events().await.unwrap(), 1);
        assert!(conn.is_connected());
        assert_eq!(
            sink.drain(),
            vec![Event::DispatchFailed(DispatchError::UnknownTarget(9))]
        );
        assert_eq!(conn.metrics().snapshot().dispatch_errors, 1);
    }
}
