//! # Error Types
//!
//! Error handling for the Bitswarm client pipeline.
//!
//! Errors are layered the same way the pipeline is:
//! - **Value errors**: containers that cannot be represented on the wire (construction time)
//! - **Codec errors**: malformed, truncated or oversized wire data (per frame, recoverable)
//! - **Frame errors**: oversized frames or inconsistent header flags (connection-fatal)
//! - **Dispatch errors**: unknown routing target or action (diagnostic only)
//! - **Cipher errors**: encryption hook failures (connection-fatal)
//!
//! `BitswarmError` wraps every layer and is what most public functions return.
//! Fatal errors additionally map onto a single [`DisconnectReason`], which is the only
//! thing an application needs to react to.
//!
//! ## Example Usage
//! ```rust
//! use bitswarm_client::core::container::ValueMap;
//! use bitswarm_client::core::serialization::{decode, encode};
//! use bitswarm_client::error::Result;
//!
//! fn roundtrip(map: ValueMap) -> Result<()> {
//!     let bytes = encode(&map.clone().into());
//!     let (decoded, _consumed) = decode(&bytes)?;
//!     assert_eq!(decoded, map.into());
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Session errors
    pub const ERR_SESSION_LOCK: &str = "Session state lock poisoned";
    pub const ERR_NO_SESSION_ID: &str = "UDP requires a session id from the TCP handshake";
    pub const ERR_UDP_NOT_INITIALIZED: &str = "UDP channel has not been initialized";

    /// Handler errors
    pub const ERR_MISSING_FIELD: &str = "Response payload is missing a required field";
    pub const ERR_NEGATIVE_SESSION_ID: &str = "Handshake carries a negative session id";
}

/// Why a decode failed. Always paired with the byte offset in [`CodecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecReason {
    /// The buffer ended in the middle of a fixed-width field
    Truncated,
    /// A length or count prefix claims more bytes than remain in the buffer
    LengthOverflow,
    /// The tag byte does not name any known value kind
    UnknownTag(u8),
    /// The tag byte is valid but not allowed here (e.g. a primitive at top level)
    UnexpectedTag(u8),
    /// String bytes are not valid UTF-8
    InvalidUtf8,
    /// A boolean byte other than 0 or 1
    InvalidBool(u8),
    /// A mapping carries the same key twice
    DuplicateKey,
    /// Containers are nested deeper than the codec allows
    DepthExceeded,
    /// A container decoded fine but does not have the envelope shape
    InvalidEnvelope,
    /// Bytes remain after the container where the caller required an exact fit
    TrailingBytes,
}

impl fmt::Display for CodecReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecReason::Truncated => write!(f, "buffer ends mid-field"),
            CodecReason::LengthOverflow => write!(f, "declared length exceeds remaining bytes"),
            CodecReason::UnknownTag(tag) => write!(f, "unknown type tag 0x{tag:02x}"),
            CodecReason::UnexpectedTag(tag) => write!(f, "unexpected type tag 0x{tag:02x}"),
            CodecReason::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            CodecReason::InvalidBool(b) => write!(f, "invalid boolean byte 0x{b:02x}"),
            CodecReason::DuplicateKey => write!(f, "duplicate mapping key"),
            CodecReason::DepthExceeded => write!(f, "container nesting too deep"),
            CodecReason::InvalidEnvelope => write!(f, "container is not a valid envelope"),
            CodecReason::TrailingBytes => write!(f, "trailing bytes after container"),
        }
    }
}

/// Malformed wire data. The frame or datagram carrying it is discarded.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("codec error at offset {offset}: {reason}")]
pub struct CodecError {
    pub offset: usize,
    pub reason: CodecReason,
}

impl CodecError {
    pub fn new(offset: usize, reason: CodecReason) -> Self {
        Self { offset, reason }
    }
}

/// A container that could not be represented on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("string of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),

    #[error("{0} elements exceed the 65535 element limit")]
    TooManyElements(usize),

    #[error("key of {0} bytes exceeds the 65535 byte limit")]
    KeyTooLong(usize),

    #[error("nesting depth {0} exceeds the maximum")]
    DepthExceeded(usize),
}

/// Header-level violations on the TCP stream or UDP datagrams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("reserved frame flag bits set: 0x{0:02x}")]
    ReservedFlags(u8),

    #[error("encrypted frame received but no cipher is installed")]
    MissingCipher,

    #[error("datagram too short: {0} bytes")]
    DatagramTooShort(usize),
}

/// Routing failures. Never fatal to the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no controller registered for target {0}")]
    UnknownTarget(u8),

    #[error("controller {target} has no handler for action {action}")]
    UnknownAction { target: u8, action: u16 },

    #[error("handler failed: {0}")]
    Handler(String),
}

/// Failures reported by the cipher hook.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("payload decompression failed")]
    Compression,
}

/// BitswarmError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum BitswarmError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Invalid value: {0}")]
    Value(#[from] ValueError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Lag monitor exceeded its missed-probe threshold")]
    LagTimeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Session unavailable: {0}")]
    SessionUnavailable(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Synchronization primitive poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl BitswarmError {
    /// The disconnection reason this error forces, or `None` when the connection survives.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            BitswarmError::Io(_) | BitswarmError::NotConnected => {
                Some(DisconnectReason::ConnectionLost)
            }
            BitswarmError::Frame(FrameError::TooLarge { .. }) => {
                Some(DisconnectReason::FrameTooLarge)
            }
            BitswarmError::Frame(_) => Some(DisconnectReason::ProtocolViolation),
            BitswarmError::Cipher(_) => Some(DisconnectReason::CipherFailure),
            BitswarmError::Timeout | BitswarmError::LagTimeout => {
                Some(DisconnectReason::LagTimeout)
            }
            BitswarmError::LockPoisoned(_) => Some(DisconnectReason::ProtocolViolation),
            BitswarmError::Codec(_)
            | BitswarmError::Value(_)
            | BitswarmError::Dispatch(_)
            | BitswarmError::SessionUnavailable(_)
            | BitswarmError::Config(_) => None,
        }
    }
}

/// The terminal signal for every fatal condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The application closed the connection
    Manual,
    /// Too many consecutive lag probes went unanswered
    LagTimeout,
    /// Socket-level failure or the server closed the stream
    ConnectionLost,
    /// An inbound frame exceeded the configured maximum size
    FrameTooLarge,
    /// Inconsistent header flags or another unrecoverable protocol error
    ProtocolViolation,
    /// The cipher hook failed; session crypto state can no longer be trusted
    CipherFailure,
    /// The server asked the client to leave
    Kicked,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisconnectReason::Manual => "manual",
            DisconnectReason::LagTimeout => "lag timeout",
            DisconnectReason::ConnectionLost => "connection lost",
            DisconnectReason::FrameTooLarge => "frame too large",
            DisconnectReason::ProtocolViolation => "protocol violation",
            DisconnectReason::CipherFailure => "cipher failure",
            DisconnectReason::Kicked => "kicked",
        };
        f.write_str(name)
    }
}

/// Type alias for Results using BitswarmError
pub type Result<T> = std::result::Result<T, BitswarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_error_reports_offset_and_reason() {
        let err = CodecError::new(7, CodecReason::UnknownTag(0x42));
        assert_eq!(err.to_string(), "codec error at offset 7: unknown type tag 0x42");
    }

    #[test]
    fn fatal_errors_map_to_one_reason() {
        let too_large = BitswarmError::Frame(FrameError::TooLarge { size: 10, max: 5 });
        assert_eq!(
            too_large.disconnect_reason(),
            Some(DisconnectReason::FrameTooLarge)
        );

        let io = BitswarmError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(io.disconnect_reason(), Some(DisconnectReason::ConnectionLost));

        let cipher = BitswarmError::Cipher(CipherError::Decrypt);
        assert_eq!(cipher.disconnect_reason(), Some(DisconnectReason::CipherFailure));
    }

    #[test]
    fn recoverable_errors_keep_connection() {
        let codec = BitswarmError::Codec(CodecError::new(0, CodecReason::Truncated));
        assert_eq!(codec.disconnect_reason(), None);

        let dispatch = BitswarmError::Dispatch(DispatchError::UnknownAction {
            target: 0,
            action: 99,
        });
        assert_eq!(dispatch.disconnect_reason(), None);
    }
}
