//! Command-line arguments for the Quote Client.
//!
//! This module defines the CLI interface using `clap`. Every flag can also be
//! set through the environment (or a `.env` file). See `main` for end-to-end usage.
use std::time::Duration;

use clap::{Parser, ValueEnum};
use quote_client::config::{BackoffPolicy, SyncConfig};
use quote_common::QuoteError;
use quote_common::net::{DEFAULT_WS_HOST, DEFAULT_WS_PORT, ws_url};

/// Reconnect delay strategy selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backoff {
    /// Same delay before every attempt.
    Flat,
    /// Doubling delay, capped by `--max-reconnect-delay-secs`.
    Exponential,
}

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Quote server host.
    #[arg(long, env = "WS_HOST", default_value = DEFAULT_WS_HOST)]
    pub host: String,

    /// Quote server WebSocket port.
    #[arg(long, env = "WS_PORT", default_value_t = DEFAULT_WS_PORT)]
    pub port: u16,

    /// Full stream URL; overrides `--host` and `--port`.
    #[arg(long, env = "QUOTE_WS_URL")]
    pub url: Option<String>,

    /// Symbols to stream, separated by commas or spaces.
    #[arg(long, env = "QUOTE_SYMBOLS")]
    pub symbols: Option<String>,

    /// Path to a text file with symbols to subscribe to.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[arg(long)]
    pub path: Option<String>,

    /// Reconnect strategy.
    #[arg(long, value_enum, default_value_t = Backoff::Flat)]
    pub backoff: Backoff,

    /// Delay before reconnecting (initial delay for exponential backoff).
    #[arg(long, default_value_t = 5)]
    pub reconnect_delay_secs: u64,

    /// Cap for exponential backoff.
    #[arg(long, default_value_t = 60)]
    pub max_reconnect_delay_secs: u64,

    /// Interval between heartbeat pings.
    #[arg(long, default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Reconnect when nothing arrives for this long. Disabled when unset.
    #[arg(long)]
    pub heartbeat_timeout_secs: Option<u64>,

    /// How often the dashboard prints the snapshot.
    #[arg(long, default_value_t = 2000)]
    pub refresh_ms: u64,

    /// Quotes older than this are flagged as stale.
    #[arg(long, default_value_t = 30)]
    pub stale_after_secs: i64,

    /// Print the snapshot as one JSON object per refresh instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Stream URL from `--url` or `--host`/`--port`.
    pub fn stream_url(&self) -> String {
        match &self.url {
            Some(url) => url.trim().to_string(),
            None => ws_url(self.host.trim(), self.port),
        }
    }

    /// Build the synchronizer settings.
    pub fn sync_config(&self) -> Result<SyncConfig, QuoteError> {
        let delay = Duration::from_secs(self.reconnect_delay_secs);
        let backoff = match self.backoff {
            Backoff::Flat => BackoffPolicy::Flat(delay),
            Backoff::Exponential => BackoffPolicy::Exponential {
                initial: delay,
                max: Duration::from_secs(self.max_reconnect_delay_secs),
            },
        };
        let config = SyncConfig::new(self.stream_url())
            .with_backoff(backoff)
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_secs))
            .with_heartbeat_timeout(self.heartbeat_timeout_secs.map(Duration::from_secs));
        config.validate()?;
        Ok(config)
    }
}
