use clap::Parser;
use quote_common::net::{DEFAULT_WS_HOST, DEFAULT_WS_PORT, addr};
use std::time::Duration;

/// Command-line arguments for the quote server.
#[derive(Debug, Parser)]
#[command(version, about = "WebSocket quote server with synthetic ticks", long_about = None)]
pub struct Args {
    /// Host or IP address to bind to
    #[arg(long, env = "WS_HOST", default_value = DEFAULT_WS_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "WS_PORT", default_value_t = DEFAULT_WS_PORT)]
    pub port: u16,

    /// Milliseconds between generated ticks for each tracked symbol
    #[arg(long, env = "QUOTE_INTERVAL_MS", default_value_t = 5000)]
    pub interval_ms: u64,

    /// Price every newly tracked symbol starts its random walk from
    #[arg(long, default_value_t = 100.0)]
    pub initial_price: f64,

    /// Socket read timeout used by sessions to interleave reads and writes, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub poll_ms: u64,
}

impl Args {
    /// `host:port` to bind the listener to.
    pub fn bind_addr(&self) -> String {
        addr(&self.host, self.port)
    }

    /// Tick period of the generator.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Session read timeout.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }
}
