//! Connection Metrics
//!
//! Atomic counters for one connection's traffic and failures. Each `Connection` owns its
//! own instance (shared with its I/O tasks through an `Arc`); there is no process-wide
//! registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Per-connection traffic and error counters
#[derive(Debug)]
pub struct Metrics {
    /// TCP frames written
    pub frames_sent: AtomicU64,
    /// TCP frames read (including ones later discarded)
    pub frames_received: AtomicU64,
    /// Bytes written on both channels
    pub bytes_sent: AtomicU64,
    /// Bytes read on both channels
    pub bytes_received: AtomicU64,
    /// UDP datagrams written
    pub datagrams_sent: AtomicU64,
    /// UDP datagrams accepted
    pub datagrams_received: AtomicU64,
    /// UDP datagrams dropped (stale, duplicate, foreign or malformed)
    pub datagrams_dropped: AtomicU64,
    /// Frames or datagrams discarded for malformed containers
    pub codec_errors: AtomicU64,
    /// Envelopes nobody could route
    pub dispatch_errors: AtomicU64,
    /// Payloads passed through the cipher in either direction
    pub encryption_total: AtomicU64,
    /// Payloads that were compressed before sending
    pub compression_total: AtomicU64,
    /// Terminal disconnections (0 or 1 for a single connection)
    pub disconnections: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            datagrams_sent: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            datagrams_dropped: AtomicU64::new(0),
            codec_errors: AtomicU64::new(0),
            dispatch_errors: AtomicU64::new(0),
            encryption_total: AtomicU64::new(0),
            compression_total: AtomicU64::new(0),
            disconnections: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn datagram_sent(&self, byte_count: u64) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn datagram_dropped(&self) {
        self.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn codec_error(&self) {
        self.codec_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_error(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encryption(&self) {
        self.encryption_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn compression(&self) {
        self.compression_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnected(&self) {
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
            encryption_total: self.encryption_total.load(Ordering::Relaxed),
            compression_total: self.compression_total.load(Ordering::Relaxed),
            disconnections: self.disconnections.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            datagrams_sent = snapshot.datagrams_sent,
            datagrams_received = snapshot.datagrams_received,
            datagrams_dropped = snapshot.datagrams_dropped,
            codec_errors = snapshot.codec_errors,
            dispatch_errors = snapshot.dispatch_errors,
            encryption_total = snapshot.encryption_total,
            compression_total = snapshot.compression_total,
            disconnections = snapshot.disconnections,
            uptime_seconds = snapshot.uptime_seconds,
            "Connection metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub datagrams_dropped: u64,
    pub codec_errors: u64,
    pub dispatch_errors: u64,
    pub encryption_total: u64,
    pub compression_total: u64,
    pub disconnections: u64,
    pub uptime_seconds: u64,
}

/// Logs how long a scope took when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.frame_sent(10);
        metrics.frame_sent(5);
        metrics.datagram_received(7);
        metrics.datagram_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.bytes_sent, 15);
        assert_eq!(snapshot.datagrams_received, 1);
        assert_eq!(snapshot.bytes_received, 7);
        assert_eq!(snapshot.datagrams_dropped, 1);
    }
}
