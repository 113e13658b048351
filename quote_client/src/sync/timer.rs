//! Cancellable timers owned by one driver loop.
//!
//! Both timers hand out a receiver for `select!`; when inactive that receiver
//! is `never()`, so the loop's shape does not change with the timer state.
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, after, never, tick};

/// One-shot reconnect timer. At most one fire is pending at any time.
#[derive(Debug)]
pub struct ReconnectTimer {
    pending: Option<Receiver<Instant>>,
    idle: Receiver<Instant>,
}

impl Default for ReconnectTimer {
    fn default() -> Self {
        Self {
            pending: None,
            idle: never(),
        }
    }
}

impl ReconnectTimer {
    /// Arm the timer, replacing any pending fire.
    pub fn schedule(&mut self, delay: Duration) {
        self.pending = Some(after(delay));
    }

    /// Disarm; a fire that has not been received yet is discarded with the receiver.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Call after receiving from `receiver()`.
    pub fn fired(&mut self) {
        self.pending = None;
    }

    #[cfg(test)]
    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Receiver to select on.
    pub fn receiver(&self) -> &Receiver<Instant> {
        self.pending.as_ref().unwrap_or(&self.idle)
    }
}

/// Periodic heartbeat ticker, running only while the connection is open.
#[derive(Debug)]
pub struct HeartbeatTimer {
    interval: Duration,
    ticker: Option<Receiver<Instant>>,
    idle: Receiver<Instant>,
}

impl HeartbeatTimer {
    /// Inactive ticker with the given period.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticker: None,
            idle: never(),
        }
    }

    /// (Re)start ticking; the first tick comes one interval from now.
    pub fn start(&mut self) {
        self.ticker = Some(tick(self.interval));
    }

    /// Stop ticking.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Receiver to select on.
    pub fn receiver(&self) -> &Receiver<Instant> {
        self.ticker.as_ref().unwrap_or(&self.idle)
    }
}
