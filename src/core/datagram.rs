//! UDP datagram layout: `[SessionId(8)] [Sequence(4)] [Container(N)]`, big-endian.

use bytes::BufMut;

use crate::error::{CodecError, FrameError, ValueError};
use crate::protocol::message::Envelope;

pub const DATAGRAM_HEADER_LEN: usize = 12;

/// Largest payload a single IPv4 UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A received datagram, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    pub session_id: u64,
    pub sequence: u32,
    pub body: &'a [u8],
}

impl<'a> Datagram<'a> {
    /// Split the fixed header off a raw datagram.
    ///
    /// # Errors
    /// Returns `FrameError::DatagramTooShort` if the header is incomplete
    pub fn parse(buf: &'a [u8]) -> Result<Self, FrameError> {
        if buf.len() < DATAGRAM_HEADER_LEN {
            return Err(FrameError::DatagramTooShort(buf.len()));
        }
        let (header, body) = buf.split_at(DATAGRAM_HEADER_LEN);
        let mut session_id = [0u8; 8];
        session_id.copy_from_slice(&header[..8]);
        let mut sequence = [0u8; 4];
        sequence.copy_from_slice(&header[8..]);

        Ok(Self {
            session_id: u64::from_be_bytes(session_id),
            sequence: u32::from_be_bytes(sequence),
            body,
        })
    }

    pub fn envelope(&self) -> Result<Envelope, CodecError> {
        Envelope::from_bytes(self.body)
    }
}

/// Serialize an envelope into a datagram.
pub fn encode_datagram(
    session_id: u64,
    sequence: u32,
    envelope: &Envelope,
) -> Result<Vec<u8>, ValueError> {
    let body = envelope.to_bytes()?;
    let mut out = Vec::with_capacity(DATAGRAM_HEADER_LEN + body.len());
    out.put_u64(session_id);
    out.put_u32(sequence);
    out.put_slice(&body);
    Ok(out)
}
