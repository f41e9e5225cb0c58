//! # Transport Layer
//!
//! The two sockets of a connection and the state they share.
//!
//! ## Components
//! - **TCP**: persistent control channel, framed by [`crate::core::codec`]
//! - **UDP**: optional best-effort channel with per-peer sequence filtering
//! - **Session**: connection id, session id, RTT snapshot and cipher state
//!
//! Both read loops push into a single queue of [`Inbound`] items; the connection drains it
//! from the application's own update tick.

use crate::error::DisconnectReason;
use crate::protocol::message::Envelope;

pub mod session;
pub mod tcp;
pub mod udp;

/// Item produced by the read loops
#[derive(Debug)]
pub enum Inbound {
    Tcp(Envelope),
    Udp(Envelope),
    /// A read or write loop hit a fatal condition or the peer went away
    Closed(DisconnectReason),
}
