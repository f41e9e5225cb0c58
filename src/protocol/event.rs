//! # Events
//!
//! Typed notifications produced by controllers, the lag monitor, and the connection
//! lifecycle. The pipeline never stores listener state itself: everything is routed to an
//! [`EventSink`] handed to the connection when it is built.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::container::ValueMap;
use crate::error::{DisconnectReason, DispatchError};

/// Everything the client reports to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Server accepted the connection and assigned a session
    Handshake {
        session_id: u64,
        token: String,
        max_message_size: i32,
    },
    Login {
        user_id: i32,
        user_name: String,
        zone: String,
    },
    LoginError {
        code: i16,
        message: String,
    },
    Logout,
    RoomJoin {
        room_id: i32,
        room_name: String,
    },
    RoomJoinError {
        code: i16,
        message: String,
    },
    UserEnterRoom {
        room_id: i32,
        user_id: i32,
        user_name: String,
    },
    UserExitRoom {
        room_id: i32,
        user_id: i32,
    },
    PublicMessage {
        room_id: i32,
        sender_id: i32,
        message: String,
    },
    /// Raw pong; consumed by the connection to feed the lag monitor
    PingPong {
        echoed_ms: i64,
    },
    /// New RTT sample folded into the moving average
    LagUpdate {
        rtt: Duration,
        average: Duration,
    },
    ExtensionResponse {
        command: String,
        room_id: Option<i32>,
        params: ValueMap,
    },
    UdpInit {
        success: bool,
    },
    /// Server-initiated disconnection notice
    Kicked {
        reason: i32,
    },
    /// A received envelope could not be routed; the connection stays up
    DispatchFailed(DispatchError),
    /// Terminal event, emitted exactly once per connection
    Disconnected {
        reason: DisconnectReason,
    },
}

/// Where events are published.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

impl EventSink for UnboundedSender<Event> {
    fn publish(&self, event: Event) {
        // A dropped receiver means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Adapts a closure into a sink
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(Event) + Send + Sync,
{
    fn publish(&self, event: Event) {
        (self.0)(event)
    }
}

/// Buffers events in memory; handy for tests and polling-style embeddings.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every event published so far
    pub fn drain(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
