//! # Utility Modules
//!
//! Supporting utilities for cryptography, compression, logging, and timing.
//!
//! ## Components
//! - **Crypto**: cipher hook, XChaCha20-Poly1305 reference cipher, per-connection cipher slot
//! - **Compression**: LZ4 payload compression with an output ceiling
//! - **Logging**: `tracing-subscriber` setup from [`crate::config::LoggingConfig`]
//! - **Metrics**: per-connection atomic counters
//! - **Timeout**: async timeout wrappers and default durations
//!
//! ## Security
//! - Session keys are zeroized on drop
//! - Decompressed output never exceeds the configured frame size

pub mod compression;
pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod timeout;
