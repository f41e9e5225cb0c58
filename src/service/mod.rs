//! # Service Layer
//!
//! High-level client API built on the transport and protocol layers.
//!
//! ## Components
//! - **Client**: [`client::Connection`], one live connection with its TCP/UDP tasks,
//!   session, lag monitor and dispatcher

pub mod client;
