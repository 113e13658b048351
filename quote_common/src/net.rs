//! Shared networking constants and helpers used by client and server.

/// Host the quote server binds to (and the client dials) when `WS_HOST` is unset.
pub const DEFAULT_WS_HOST: &str = "localhost";
/// WebSocket port of the quote stream when `WS_PORT` is unset.
pub const DEFAULT_WS_PORT: u16 = 8765;

/// Helper to format a host with a port like "host:port".
pub fn addr(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Builds a plain `ws://host:port` URL for the quote stream.
pub fn ws_url(host: &str, port: u16) -> String {
    format!("ws://{}", addr(host, port))
}
