//! # TCP Frames
//!
//! A frame is one length-prefixed unit on the TCP stream:
//!
//! ```text
//! [Flags(1)] [Length(2) | Length(4) if EXTENDED] [Payload(Length)]
//! ```
//!
//! The payload is a codec-encoded container, optionally compressed and then encrypted.
//! Lengths are big-endian and count payload bytes only.

use bitflags::bitflags;
use bytes::{BufMut, Bytes};

use crate::error::FrameError;

/// Header size with a 2-byte length
pub const SHORT_HEADER_LEN: usize = 3;

/// Header size with a 4-byte length
pub const EXTENDED_HEADER_LEN: usize = 5;

bitflags! {
    /// Frame header flag byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u8 {
        /// Payload went through the session cipher
        const ENCRYPTED = 0b0000_0001;
        /// Length field is 4 bytes instead of 2
        const EXTENDED = 0b0000_0010;
        /// Payload is LZ4-compressed (applied before encryption)
        const COMPRESSED = 0b0000_0100;
    }
}

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: FrameFlags,
    pub header_len: usize,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Parse a header from the front of `src`.
    ///
    /// Returns `Ok(None)` until enough bytes for the header have arrived.
    ///
    /// # Errors
    /// Returns `FrameError::ReservedFlags` when undefined flag bits are set
    pub fn parse(src: &[u8]) -> Result<Option<Self>, FrameError> {
        let Some(&raw) = src.first() else {
            return Ok(None);
        };
        let flags = FrameFlags::from_bits(raw)
            .ok_or(FrameError::ReservedFlags(raw & !FrameFlags::all().bits()))?;

        if flags.contains(FrameFlags::EXTENDED) {
            if src.len() < EXTENDED_HEADER_LEN {
                return Ok(None);
            }
            let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
            Ok(Some(Self {
                flags,
                header_len: EXTENDED_HEADER_LEN,
                payload_len: len,
            }))
        } else {
            if src.len() < SHORT_HEADER_LEN {
                return Ok(None);
            }
            let len = u16::from_be_bytes([src[1], src[2]]) as usize;
            Ok(Some(Self {
                flags,
                header_len: SHORT_HEADER_LEN,
                payload_len: len,
            }))
        }
    }

    pub fn frame_len(&self) -> usize {
        self.header_len + self.payload_len
    }
}

/// A complete frame as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: FrameFlags,
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame; the EXTENDED flag is derived from the payload size.
    pub fn new(flags: FrameFlags, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let mut flags = flags;
        flags.set(FrameFlags::EXTENDED, payload.len() > u16::MAX as usize);
        Self { flags, payload }
    }

    pub fn header_len(&self) -> usize {
        if self.flags.contains(FrameFlags::EXTENDED) {
            EXTENDED_HEADER_LEN
        } else {
            SHORT_HEADER_LEN
        }
    }

    /// Total bytes this frame occupies on the wire
    pub fn wire_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }

    pub fn write_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.flags.bits());
        if self.flags.contains(FrameFlags::EXTENDED) {
            dst.put_u32(self.payload.len() as u32);
        } else {
            dst.put_u16(self.payload.len() as u16);
        }
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.write_to(&mut out);
        out
    }
}
