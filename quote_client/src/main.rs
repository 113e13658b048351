//! Quote Client: a terminal dashboard over the live quote synchronizer.
//!
//! It reads the symbols of interest from the command line and/or a text file,
//! keeps a WebSocket subscription to the quote server alive (reconnecting on
//! failure), and periodically logs the latest quote per symbol, flagging quotes
//! that have gone stale.
//!
//! Usage example (CLI):
//! ```bash
//! quote_client --host 192.168.0.10 --port 8765 --symbols AAPL,MSFT --path ./symbols.txt
//! ```
//!
//! The symbol file should contain symbols separated by commas, spaces, or new lines.
//! See `quote_common::symbols` for details.
#![warn(missing_docs)]
mod args;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use crossbeam_channel::{bounded, select, tick};
use log::{info, warn};
use quote_client::sync::{ConnectionStatus, Synchronizer};
use quote_client::QuoteSnapshot;
use quote_common::symbols::{SymbolList, SymbolParser, parse_symbol_list};
use quote_common::{QuoteError, Result};

use crate::args::Args;

fn main() -> Result<(), QuoteError> {
    dotenvy::dotenv().ok();
    init_logger();
    let args = Args::parse();

    let symbols = collect_symbols(&args)?;
    if symbols.is_empty() {
        warn!("No symbols given; only the connection status will be shown");
    } else {
        info!("Symbols: {:?}", symbols);
    }

    let config = args.sync_config()?;
    info!("Streaming from {}", config.url);
    let sync = Synchronizer::new(config)?;
    let statuses = sync.watch_status();
    sync.set_symbols(&symbols);
    sync.start();

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down client...");
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| QuoteError::Config(format!("Error setting Ctrl+C handler: {}", e)))?;

    let refresh = tick(Duration::from_millis(args.refresh_ms.max(100)));
    let stale_after = chrono::Duration::seconds(args.stale_after_secs);
    info!("Client is running. Press Ctrl+C to exit.");

    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(statuses) -> status => match status {
                Ok(ConnectionStatus::Open) => info!("Connected"),
                Ok(ConnectionStatus::Closed) => warn!("Disconnected; retrying in the background"),
                Ok(status) => info!("Connection {}", status),
                Err(_) => break,
            },
            recv(refresh) -> _ => {
                let snapshot = sync.snapshot();
                if args.json {
                    print_json(&snapshot)?;
                } else {
                    print_table(&snapshot, sync.status(), stale_after);
                }
            },
        }
    }

    sync.stop();
    info!("Client stopped");
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Union of `--symbols` and the symbols file, normalized.
fn collect_symbols(args: &Args) -> Result<BTreeSet<String>, QuoteError> {
    let mut symbols = BTreeSet::new();
    if let Some(list) = &args.symbols {
        symbols.extend(parse_symbol_list(list)?);
    }
    if let Some(raw) = &args.path {
        let file_path = normalize_path(raw);
        if !is_file_exist(&file_path) {
            return Err(QuoteError::Config(format!(
                "symbols file {} does not exist",
                file_path.display()
            )));
        }
        let file = File::open(&file_path)?;
        symbols.extend(SymbolList::parse_from_file(BufReader::new(file))?);
    }
    Ok(symbols)
}

fn print_table(snapshot: &QuoteSnapshot, status: ConnectionStatus, stale_after: chrono::Duration) {
    let now = Utc::now();
    let stale = snapshot.stale_symbols(stale_after, now);
    info!(
        "--- {} symbol(s), {} stale, connection {} ---",
        snapshot.len(),
        stale.len(),
        status
    );
    for symbol in snapshot.symbols() {
        let quote = &snapshot[symbol];
        let age = quote.age(now);
        let marker = if stale.binary_search(&symbol).is_ok() { " STALE" } else { "" };
        info!(
            "QUOTE: {:<8} Price={:>10.2} Size={:>8} Exchange={:<8} Age={}s{}",
            symbol,
            quote.price,
            quote.size,
            quote.exchange,
            age.num_seconds(),
            marker
        );
    }
}

fn print_json(snapshot: &QuoteSnapshot) -> Result<(), QuoteError> {
    println!("{}", serde_json::to_string(snapshot)?);
    Ok(())
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}

/// Returns `true` if the provided path exists and is a regular file.
fn is_file_exist(path: &PathBuf) -> bool {
    path.exists() && path.is_file()
}
