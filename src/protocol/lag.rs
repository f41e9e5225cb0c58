//! # Lag Monitor
//!
//! Periodic round-trip probing as a pure state machine. It owns no timer and no socket:
//! the connection calls [`LagMonitor::poll`] with the current instant from its update tick
//! and sends whatever ping it gets back, then feeds pongs in through
//! [`LagMonitor::on_pong`].
//!
//! ```text
//! Idle --start--> Probing --stop--> Idle
//!                    |
//!                    +--missed > threshold--> Disconnected
//! ```
//!
//! A probe counts as missed when the next one falls due while it is still unanswered.
//! Any matching pong resets the miss counter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::core::container::ValueMap;
use crate::protocol::controllers::keys;
use crate::protocol::message::{actions, Envelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagState {
    Idle,
    Probing,
    Disconnected,
}

/// What the owner of the connection has to do after a poll
#[derive(Debug, Clone, PartialEq)]
pub enum LagAction {
    /// Send this ping envelope on the control channel
    SendPing(Envelope),
    /// The miss threshold was exceeded; close with a lag timeout
    Timeout,
}

#[derive(Debug)]
pub struct LagMonitor {
    interval: Duration,
    miss_threshold: u32,
    window: usize,
    origin: Instant,
    state: LagState,
    next_probe: Option<Instant>,
    /// Timestamps (ms since `origin`) of unanswered pings, oldest first
    outstanding: VecDeque<i64>,
    missed: u32,
    samples: VecDeque<Duration>,
    last_rtt: Option<Duration>,
}

impl LagMonitor {
    /// `origin` anchors the millisecond timestamps carried in pings.
    pub fn new(interval: Duration, miss_threshold: u32, window: usize, origin: Instant) -> Self {
        Self {
            interval,
            miss_threshold,
            window: window.max(1),
            origin,
            state: LagState::Idle,
            next_probe: None,
            outstanding: VecDeque::new(),
            missed: 0,
            samples: VecDeque::new(),
            last_rtt: None,
        }
    }

    pub fn from_config(config: &ClientConfig, origin: Instant) -> Self {
        Self::new(
            config.lag_probe_interval,
            config.lag_miss_threshold,
            config.lag_average_window,
            origin,
        )
    }

    pub fn state(&self) -> LagState {
        self.state
    }

    /// Begin probing; the first ping is due immediately.
    ///
    /// Has no effect once the monitor has declared the connection dead.
    pub fn start(&mut self, now: Instant) {
        if self.state == LagState::Disconnected {
            return;
        }
        self.state = LagState::Probing;
        self.next_probe = Some(now);
        self.missed = 0;
        self.outstanding.clear();
    }

    pub fn stop(&mut self) {
        if self.state == LagState::Probing {
            self.state = LagState::Idle;
        }
        self.next_probe = None;
        self.outstanding.clear();
    }

    /// Advance the schedule to `now`.
    pub fn poll(&mut self, now: Instant) -> Option<LagAction> {
        if self.state != LagState::Probing {
            return None;
        }
        let due = self.next_probe?;
        if now < due {
            return None;
        }
        self.next_probe = Some(now + self.interval);

        if !self.outstanding.is_empty() {
            self.missed += 1;
            debug!(missed = self.missed, threshold = self.miss_threshold, "Lag probe unanswered");
            if self.missed > self.miss_threshold {
                warn!(missed = self.missed, "Lag threshold exceeded, declaring connection dead");
                self.state = LagState::Disconnected;
                self.next_probe = None;
                self.outstanding.clear();
                return Some(LagAction::Timeout);
            }
        }

        let stamp = self.millis_since_origin(now);
        let mut payload = ValueMap::new();
        if let Err(e) = payload.insert(keys::TIMESTAMP, stamp) {
            warn!(error = %e, "Could not build lag probe, skipping this interval");
            return None;
        }
        self.outstanding.push_back(stamp);
        Some(LagAction::SendPing(Envelope::system(actions::PING_PONG, payload)))
    }

    /// Account for a pong echoing `echoed_ms`.
    ///
    /// Returns the RTT sample, or `None` if the echo matches no outstanding ping.
    pub fn on_pong(&mut self, echoed_ms: i64, now: Instant) -> Option<Duration> {
        let position = self.outstanding.iter().position(|&t| t == echoed_ms);
        let Some(position) = position else {
            debug!(echoed_ms, "Pong matches no outstanding probe, ignoring");
            return None;
        };
        // Older probes are answered implicitly
        self.outstanding.drain(..=position);
        self.missed = 0;

        let sent = self.origin + Duration::from_millis(echoed_ms.max(0) as u64);
        let rtt = now.saturating_duration_since(sent);

        self.samples.push_back(rtt);
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }
        self.last_rtt = Some(rtt);
        Some(rtt)
    }

    /// Simple moving average over the last `window` samples
    pub fn average_rtt(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// When the next probe is due, if probing
    pub fn next_probe(&self) -> Option<Instant> {
        self.next_probe
    }

    fn millis_since_origin(&self, now: Instant) -> i64 {
        now.saturating_duration_since(self.origin).as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ping_stamp(action: Option<LagAction>) -> i64 {
        match action {
            Some(LagAction::SendPing(envelope)) => {
                assert_eq!(envelope.action, actions::PING_PONG);
                envelope.payload.get_long("t").unwrap()
            }
            other => panic!("expected ping, got {other:?}"),
        }
    }

    #[test]
    fn idle_monitor_never_probes() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(1000), 3, 5, t0);
        assert_eq!(lag.poll(t0 + ms(5000)), None);
        assert_eq!(lag.state(), LagState::Idle);
    }

    #[test]
    fn ping_envelope_survives_the_wire() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(1000), 3, 5, t0);
        lag.start(t0);
        let _ = lag.poll(t0);

        let Some(LagAction::SendPing(ping)) = lag.poll(t0 + ms(1250)) else {
            panic!("expected a second ping");
        };
        let decoded = Envelope::from_bytes(&ping.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, ping);
        assert_eq!(
            decoded.payload.get(keys::TIMESTAMP),
            Some(&crate::core::value::Value::Long(1250))
        );
        assert_eq!(lag.outstanding(), 2);
    }

    #[test]
    fn pong_after_fifty_ms_yields_fifty_ms_rtt() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(1000), 3, 5, t0);
        lag.start(t0);

        let stamp = ping_stamp(lag.poll(t0));
        assert_eq!(stamp, 0);
        assert_eq!(lag.on_pong(stamp, t0 + ms(50)), Some(ms(50)));
        assert_eq!(lag.average_rtt(), Some(ms(50)));
        assert_eq!(lag.outstanding(), 0);
    }

    #[test]
    fn probes_follow_the_interval() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(1000), 3, 5, t0);
        lag.start(t0);

        let stamp = ping_stamp(lag.poll(t0));
        lag.on_pong(stamp, t0 + ms(10));
        assert_eq!(lag.poll(t0 + ms(999)), None);
        assert_eq!(ping_stamp(lag.poll(t0 + ms(1000))), 1000);
    }

    #[test]
    fn timeout_fires_exactly_once() {
        let t0 = Instant::now();
        let threshold = 3;
        let mut lag = LagMonitor::new(ms(100), threshold, 5, t0);
        lag.start(t0);

        let mut timeouts = 0;
        let mut pings = 0;
        for tick in 0..20u64 {
            match lag.poll(t0 + ms(tick * 100)) {
                Some(LagAction::SendPing(_)) => pings += 1,
                Some(LagAction::Timeout) => timeouts += 1,
                None => {}
            }
        }
        assert_eq!(timeouts, 1);
        // first ping plus one per tolerated miss
        assert_eq!(pings, threshold as usize + 1);
        assert_eq!(lag.state(), LagState::Disconnected);

        lag.start(t0 + ms(5000));
        assert_eq!(lag.state(), LagState::Disconnected);
    }

    #[test]
    fn pong_resets_missed_counter() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(100), 2, 5, t0);
        lag.start(t0);

        ping_stamp(lag.poll(t0));
        let late = ping_stamp(lag.poll(t0 + ms(100)));
        assert_eq!(lag.missed(), 1);

        // answering the newer probe clears the older one too
        assert_eq!(lag.on_pong(late, t0 + ms(130)), Some(ms(30)));
        assert_eq!(lag.missed(), 0);
        assert_eq!(lag.outstanding(), 0);
    }

    #[test]
    fn unknown_pong_is_ignored() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(100), 2, 5, t0);
        lag.start(t0);
        ping_stamp(lag.poll(t0));
        assert_eq!(lag.on_pong(12345, t0 + ms(10)), None);
        assert_eq!(lag.outstanding(), 1);
    }

    #[test]
    fn moving_average_is_windowed() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(100), 2, 2, t0);
        lag.start(t0);

        for (i, rtt) in [10u64, 20, 60].iter().enumerate() {
            let sent = t0 + ms(i as u64 * 100);
            let stamp = ping_stamp(lag.poll(sent));
            lag.on_pong(stamp, sent + ms(*rtt));
        }
        assert_eq!(lag.last_rtt(), Some(ms(60)));
        assert_eq!(lag.average_rtt(), Some(ms(40)));
    }

    #[test]
    fn stop_returns_to_idle() {
        let t0 = Instant::now();
        let mut lag = LagMonitor::new(ms(100), 2, 2, t0);
        lag.start(t0);
        ping_stamp(lag.poll(t0));
        lag.stop();
        assert_eq!(lag.state(), LagState::Idle);
        assert_eq!(lag.outstanding(), 0);
        assert_eq!(lag.poll(t0 + ms(1000)), None);
    }
}
