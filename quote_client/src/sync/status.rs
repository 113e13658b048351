//! Connection status exposed to the presentation layer.
use serde::Serialize;
use strum_macros::{Display, EnumString};

/// Where the synchronizer is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Created, `start` not called yet.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Streaming.
    Open,
    /// Disconnected, waiting for the reconnect timer.
    Closed,
    /// Stopped for good.
    Terminated,
}

impl ConnectionStatus {
    /// `true` only while frames can flow.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Open)
    }

    /// `true` once `stop` has run.
    pub fn is_terminated(&self) -> bool {
        matches!(self, ConnectionStatus::Terminated)
    }
}
