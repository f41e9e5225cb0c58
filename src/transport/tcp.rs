//! # TCP Control Channel
//!
//! Connect helper plus the two I/O tasks of a connection:
//!
//! - the **reader** splits the stream into frames, opens them through the envelope codec
//!   and pushes envelopes into the connection's inbound queue in stream order;
//! - the **writer** drains already sealed frames from an outbound queue onto the socket.
//!
//! Both tasks end by pushing a single [`Inbound::Closed`] carrying the reason, unless the
//! connection is already gone.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, instrument, warn};

use crate::core::codec::{EnvelopeCodec, FrameCodec};
use crate::core::packet::{Frame, FrameFlags};
use crate::error::{BitswarmError, DisconnectReason, Result};
use crate::transport::Inbound;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

/// Open the control channel with a connect timeout.
#[instrument(skip(timeout))]
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = with_timeout_error(
        async { TcpStream::connect(addr).await.map_err(BitswarmError::from) },
        timeout,
    )
    .await?;
    stream.set_nodelay(true)?;
    info!(peer = %stream.peer_addr()?, "Control channel connected");
    Ok(stream)
}

/// Spawn the read loop for the stream half `reader`.
pub fn spawn_reader<R>(
    reader: R,
    codec: EnvelopeCodec,
    inbound: mpsc::UnboundedSender<Inbound>,
    metrics: Arc<Metrics>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reason = read_loop(reader, codec, &inbound, &metrics).await;
        let _ = inbound.send(Inbound::Closed(reason));
    })
}

async fn read_loop<R>(
    reader: R,
    codec: EnvelopeCodec,
    inbound: &mpsc::UnboundedSender<Inbound>,
    metrics: &Metrics,
) -> DisconnectReason
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, codec.frame_codec());

    while let Some(next) = frames.next().await {
        let frame = match next {
            Ok(frame) => frame,
            Err(e) => return fatal(e, "Control channel read failed"),
        };
        metrics.frame_received(frame.wire_len() as u64);
        if frame.flags.contains(FrameFlags::ENCRYPTED) {
            metrics.encryption();
        }

        match codec.open(frame) {
            Ok(Ok(envelope)) => {
                debug!(target_ns = %envelope.target, action = envelope.action, "Envelope received");
                if inbound.send(Inbound::Tcp(envelope)).is_err() {
                    // Connection dropped its queue
                    return DisconnectReason::Manual;
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Discarding malformed frame");
                metrics.codec_error();
            }
            Err(e) => return fatal(e, "Failed to open frame"),
        }
    }

    info!("Server closed the control channel");
    DisconnectReason::ConnectionLost
}

fn fatal(e: BitswarmError, context: &'static str) -> DisconnectReason {
    let reason = e
        .disconnect_reason()
        .unwrap_or(DisconnectReason::ProtocolViolation);
    error!(error = %e, %reason, "{context}");
    reason
}

/// Spawn the write loop for the stream half `writer`.
///
/// The loop ends once every sender of `outbound` is dropped and the queue is flushed.
pub fn spawn_writer<W>(
    writer: W,
    codec: FrameCodec,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<Inbound>,
    metrics: Arc<Metrics>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, codec);

        while let Some(frame) = outbound.recv().await {
            let len = frame.wire_len();
            if let Err(e) = sink.send(frame).await {
                let reason = fatal(e, "Control channel write failed");
                let _ = inbound.send(Inbound::Closed(reason));
                return;
            }
            metrics.frame_sent(len as u64);
        }

        if let Err(e) = sink.close().await {
            debug!(error = %e, "Error shutting down control channel");
        }
    })
}
