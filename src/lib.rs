//! # bitswarm-client
//!
//! Client SDK for the Bitswarm real-time multiplayer protocol.
//!
//! The crate is layered bottom-up:
//!
//! - [`core`]: typed values, the binary container codec, TCP frames and UDP datagrams
//! - [`transport`]: TCP read/write tasks, the sequenced UDP channel, session state
//! - [`protocol`]: envelopes, dispatcher and controllers, request builders, lag monitor
//! - [`service`]: [`Connection`], which wires all of the above to an [`EventSink`]
//!
//! Configuration lives in [`config`], errors in [`error`], and supporting pieces
//! (cipher hook, compression, logging, metrics) in [`utils`].
//!
//! ## Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use bitswarm_client::{ClientConfig, Connection, HandshakeRequest};
//! use bitswarm_client::protocol::event::Event;
//!
//! # async fn run() -> bitswarm_client::Result<()> {
//! bitswarm_client::init_logging(&Default::default())?;
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
//! let mut conn = Connection::connect(ClientConfig::default(), Arc::new(tx)).await?;
//! conn.send(&HandshakeRequest::default())?;
//!
//! while conn.is_connected() {
//!     conn.wait_events().await?;
//!     while let Ok(event) = rx.try_recv() {
//!         println!("{event:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{ClientConfig, SdkConfig};
pub use crate::core::container::{Container, ValueList, ValueMap};
pub use crate::core::value::Value;
pub use error::{BitswarmError, DisconnectReason, Result};
pub use protocol::event::{Event, EventSink};
pub use protocol::message::{Envelope, Target};
pub use protocol::requests::{
    ExtensionRequest, HandshakeRequest, JoinRoomRequest, LoginRequest, LogoutRequest,
    PublicMessageRequest, Request,
};
pub use service::client::Connection;
pub use utils::logging::init_logging;
