//! # Stream Codecs
//!
//! tokio-util codecs for the TCP control channel.
//!
//! - [`FrameCodec`] splits the byte stream into [`Frame`]s and enforces the size limit.
//! - [`EnvelopeCodec`] layers the payload pipeline on top: encode, compress, encrypt on the
//!   way out; decrypt, decompress, decode on the way in.
//!
//! Error severity is encoded in the types. A malformed container is returned as an
//! `Ok(Some(Err(CodecError)))` item so the read loop can drop that one frame and carry on;
//! anything returned as the codec's own error tears the stream down.

use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{Frame, FrameFlags, FrameHeader};
use crate::error::{BitswarmError, CodecError, FrameError, Result};
use crate::protocol::message::Envelope;
use crate::utils::compression;
use crate::utils::crypto::CipherSlot;

/// Default ceiling for a single frame payload (1MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length-prefixed frame splitter.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = BitswarmError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(header) = FrameHeader::parse(src)? else {
            return Ok(None);
        };

        // Checked before buffering so a hostile length cannot make us reserve memory
        if header.payload_len > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: header.payload_len,
                max: self.max_frame_size,
            }
            .into());
        }

        let frame_len = header.frame_len();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        // split_to + freeze hands the payload out without copying
        let mut raw = src.split_to(frame_len);
        raw.advance(header.header_len);
        Ok(Some(Frame {
            flags: header.flags,
            payload: raw.freeze(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = BitswarmError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        if frame.payload.len() > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size: frame.payload.len(),
                max: self.max_frame_size,
            }
            .into());
        }
        dst.reserve(frame.wire_len());
        frame.write_to(dst);
        Ok(())
    }
}

/// Envelope-level codec sharing the connection's cipher state.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    frames: FrameCodec,
    cipher: Arc<CipherSlot>,
    compression_threshold: usize,
}

impl EnvelopeCodec {
    pub fn new(max_frame_size: usize, cipher: Arc<CipherSlot>) -> Self {
        Self {
            frames: FrameCodec::new(max_frame_size),
            cipher,
            compression_threshold: 0,
        }
    }

    /// Compress payloads at least this large; 0 disables compression
    pub fn with_compression(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    pub fn frame_codec(&self) -> FrameCodec {
        self.frames
    }

    /// Turn an envelope into a ready-to-write frame.
    ///
    /// # Errors
    /// Fails if the envelope cannot be encoded or the cipher hook fails
    pub fn seal(&self, envelope: &Envelope) -> Result<Frame> {
        let mut payload = Bytes::from(envelope.to_bytes()?);
        let mut flags = FrameFlags::empty();

        if compression::should_compress(&payload, self.compression_threshold) {
            let compressed = compression::compress(&payload);
            if compressed.len() < payload.len() {
                payload = Bytes::from(compressed);
                flags |= FrameFlags::COMPRESSED;
            }
        }

        if let Some(sealed) = self.cipher.seal(&payload)? {
            payload = Bytes::from(sealed);
            flags |= FrameFlags::ENCRYPTED;
        }

        Ok(Frame::new(flags, payload))
    }

    /// Reverse [`seal`](Self::seal).
    ///
    /// The outer `Result` carries connection-fatal failures (cipher, decompression); the
    /// inner one a malformed container that only costs this frame.
    pub fn open(&self, frame: Frame) -> Result<std::result::Result<Envelope, CodecError>> {
        let mut payload = frame.payload;

        if frame.flags.contains(FrameFlags::ENCRYPTED) {
            payload = Bytes::from(self.cipher.open(&payload)?);
        }
        if frame.flags.contains(FrameFlags::COMPRESSED) {
            payload = Bytes::from(compression::decompress(
                &payload,
                self.frames.max_frame_size(),
            )?);
        }

        Ok(Envelope::from_bytes(&payload))
    }
}

impl Decoder for EnvelopeCodec {
    type Item = std::result::Result<Envelope, CodecError>;
    type Error = BitswarmError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.frames.decode(src)? {
            Some(frame) => self.open(frame).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = BitswarmError;

    fn encode(&mut self, envelope: Envelope, dst: &mut BytesMut) -> Result<()> {
        let frame = self.seal(&envelope)?;
        self.frames.encode(frame, dst)
    }
}
