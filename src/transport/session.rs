//! Per-connection session state.
//!
//! Written by the connection while it drains its queue, read from anywhere through the
//! synchronized accessors below. Nothing here outlives the connection: a reconnect builds a
//! fresh [`Session`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{constants, BitswarmError, Result};
use crate::utils::crypto::CipherSlot;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Snapshot of the session fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub connection_id: u64,
    /// Assigned by the server in the handshake response
    pub session_id: Option<u64>,
    pub token: Option<String>,
    pub max_message_size: Option<usize>,
    pub last_rtt: Option<Duration>,
    pub average_rtt: Option<Duration>,
}

#[derive(Debug)]
pub struct Session {
    state: RwLock<SessionInfo>,
    cipher: Arc<CipherSlot>,
}

impl Session {
    pub fn new() -> Self {
        let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            state: RwLock::new(SessionInfo {
                connection_id,
                ..SessionInfo::default()
            }),
            cipher: Arc::new(CipherSlot::new()),
        }
    }

    /// Cipher state shared with the TCP codec
    pub fn cipher(&self) -> Arc<CipherSlot> {
        Arc::clone(&self.cipher)
    }

    pub fn info(&self) -> Result<SessionInfo> {
        self.read(|s| s.clone())
    }

    pub fn connection_id(&self) -> Result<u64> {
        self.read(|s| s.connection_id)
    }

    pub fn session_id(&self) -> Result<Option<u64>> {
        self.read(|s| s.session_id)
    }

    /// Store what the handshake response assigned
    pub fn establish(&self, session_id: u64, token: String, max_message_size: usize) -> Result<()> {
        self.write(|s| {
            s.session_id = Some(session_id);
            s.token = Some(token);
            s.max_message_size = (max_message_size > 0).then_some(max_message_size);
        })
    }

    pub fn record_rtt(&self, last: Duration, average: Option<Duration>) -> Result<()> {
        self.write(|s| {
            s.last_rtt = Some(last);
            s.average_rtt = average;
        })
    }

    pub fn average_rtt(&self) -> Result<Option<Duration>> {
        self.read(|s| s.average_rtt)
    }

    /// Forget the negotiated key material and session identity
    pub fn release(&self) {
        self.cipher.clear();
        if let Ok(mut state) = self.state.write() {
            state.session_id = None;
            state.token = None;
        }
    }

    fn read<T>(&self, f: impl FnOnce(&SessionInfo) -> T) -> Result<T> {
        let state = self
            .state
            .read()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_SESSION_LOCK))?;
        Ok(f(&state))
    }

    fn write(&self, f: impl FnOnce(&mut SessionInfo)) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| BitswarmError::LockPoisoned(constants::ERR_SESSION_LOCK))?;
        f(&mut state);
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
