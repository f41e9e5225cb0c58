//! # Core Protocol Components
//!
//! The typed value model, the binary codec, and the wire framing built on it.
//!
//! ## Components
//! - **Value / Container**: closed set of wire-representable values and the two container shapes
//! - **Serialization**: tag-prefixed binary encoding of containers
//! - **Packet**: TCP frame header (flags + 2 or 4 byte length)
//! - **Codec**: tokio-util codecs for framing and the envelope payload pipeline
//! - **Datagram**: UDP header (session id + sequence)
//!
//! ## Wire Format
//! ```text
//! TCP: [Flags(1)] [Length(2|4)] [Payload(N)]
//! UDP: [SessionId(8)] [Sequence(4)] [Container(N)]
//! ```
//!
//! ## Security
//! - Every length is checked against the remaining buffer before allocation
//! - Frame size is capped by configuration, decompressed size by the same cap
//! - Container nesting is capped at [`container::MAX_DEPTH`]

pub mod codec;
pub mod container;
pub mod datagram;
pub mod packet;
pub mod serialization;
pub mod value;
