//! # Protocol Layer
//!
//! Envelopes, routing and the state machines that sit between the sockets and the
//! application.
//!
//! ## Components
//! - **Message**: [`message::Envelope`] and the routing target / action id tables
//! - **Dispatcher**: target → controller → handler routing
//! - **Controllers**: built-in System and Extension handler tables
//! - **Requests**: builders for outbound envelopes
//! - **Events**: typed notifications and the [`event::EventSink`] they are published to
//! - **Lag**: round-trip probing and missed-probe accounting

pub mod controllers;
pub mod dispatcher;
pub mod event;
pub mod lag;
pub mod message;
pub mod requests;
