//! Synchronizer settings.
//!
//! `SyncConfig::default()` reproduces the dashboard's historical behavior: a
//! local `ws://localhost:8765` stream, a flat 5 second reconnect delay with
//! unlimited retries, a ping every 30 seconds and no heartbeat timeout.
use std::time::Duration;

use quote_common::QuoteError;
use quote_common::net::{DEFAULT_WS_HOST, DEFAULT_WS_PORT, ws_url};

/// Delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Interval between `ping` frames while the connection is open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Upper bound for the TCP connect plus the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a reader thread blocks on the socket before checking for outbound frames.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Same delay before every attempt.
    Flat(Duration),
    /// Delay doubles per consecutive failed attempt, capped at `max`.
    Exponential {
        /// Delay before the first attempt.
        initial: Duration,
        /// Upper bound for any delay.
        max: Duration,
    },
}

impl BackoffPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::Flat(delay) => delay,
            BackoffPolicy::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Flat(DEFAULT_RECONNECT_DELAY)
    }
}

/// Everything a `Synchronizer` needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quote stream endpoint, e.g. `ws://localhost:8765`.
    pub url: String,
    /// Reconnect delay policy.
    pub backoff: BackoffPolicy,
    /// Interval between heartbeat pings while open.
    pub heartbeat_interval: Duration,
    /// Force a reconnect after this long without any inbound frame. Off by default.
    pub heartbeat_timeout: Option<Duration>,
    /// Socket read timeout used by the transport thread.
    pub poll_interval: Duration,
    /// Give up on a connection attempt that has not opened after this long.
    pub connect_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: ws_url(DEFAULT_WS_HOST, DEFAULT_WS_PORT),
            backoff: BackoffPolicy::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SyncConfig {
    /// Default settings pointed at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the reconnect policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enable (or disable with `None`) the heartbeat timeout.
    pub fn with_heartbeat_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the transport poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the connect and handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> Result<(), QuoteError> {
        if !self.url.starts_with("ws://") {
            return Err(QuoteError::Config(format!(
                "url must start with ws:// (TLS streams are not built in), got {:?}",
                self.url
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(QuoteError::Config("heartbeat interval must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(QuoteError::Config("poll interval must be positive".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(QuoteError::Config("connect timeout must be positive".into()));
        }
        if let Some(timeout) = self.heartbeat_timeout {
            if timeout <= self.heartbeat_interval {
                return Err(QuoteError::Config(format!(
                    "heartbeat timeout ({:?}) must exceed the heartbeat interval ({:?})",
                    timeout, self.heartbeat_interval
                )));
            }
        }
        if let BackoffPolicy::Exponential { initial, max } = self.backoff {
            if initial > max {
                return Err(QuoteError::Config("backoff initial delay exceeds its cap".into()));
            }
        }
        Ok(())
    }
}
