//! Keep-alive tracker for the open connection.
//!
//! Records the last time any frame arrived from the server and, when a
//! timeout is configured, reports whether the connection has gone quiet for
//! longer than allowed.
//!
//! Design notes:
//! - Time is measured using `std::time::Instant`, which is monotonic and immune to system
//!   clock changes.
//! - With no timeout configured the tracker never expires; a stalled but
//!   still-open socket is then only replaced once the transport reports a close.
use std::time::{Duration, Instant};

/// Last-seen bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct Liveness {
    /// Most recent frame (or the open event) on the current connection.
    last_seen: Option<Instant>,
    /// Threshold after which the connection is considered stalled.
    timeout: Option<Duration>,
}

impl Liveness {
    /// Create a tracker; `None` disables expiry.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            last_seen: None,
            timeout,
        }
    }

    /// Record a frame (or the open event) at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last_seen = Some(now);
    }

    /// Forget the previous connection.
    pub fn clear(&mut self) {
        self.last_seen = None;
    }

    /// Check whether the quiet period exceeded the timeout.
    pub fn is_expired(&self, now: Instant) -> bool {
        match (self.timeout, self.last_seen) {
            (Some(timeout), Some(last_seen)) => now.saturating_duration_since(last_seen) > timeout,
            _ => false,
        }
    }

    /// Time since the last frame, if any was recorded.
    pub fn quiet_for(&self, now: Instant) -> Option<Duration> {
        self.last_seen.map(|last| now.saturating_duration_since(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_timeout_never_expires() {
        let start = Instant::now();
        let mut liveness = Liveness::new(None);
        liveness.record(start);
        assert!(!liveness.is_expired(start + Duration::from_secs(3600)));
    }

    #[test]
    fn expires_after_quiet_period() {
        let start = Instant::now();
        let mut liveness = Liveness::new(Some(Duration::from_secs(10)));
        liveness.record(start);
        assert!(!liveness.is_expired(start + Duration::from_secs(10)));
        assert!(liveness.is_expired(start + Duration::from_secs(11)));

        liveness.record(start + Duration::from_secs(11));
        assert!(!liveness.is_expired(start + Duration::from_secs(12)));
        assert_eq!(
            liveness.quiet_for(start + Duration::from_secs(12)),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn cleared_tracker_does_not_expire() {
        let start = Instant::now();
        let mut liveness = Liveness::new(Some(Duration::from_secs(1)));
        liveness.record(start);
        liveness.clear();
        assert!(!liveness.is_expired(start + Duration::from_secs(5)));
    }
}
