//! Quotes WebSocket streaming server.
//!
//! This binary accepts WebSocket clients and streams synthetic trade ticks for
//! the symbols each client subscribes to. Internally, it wires together three
//! building blocks:
//!
//! - `QuoteGenerator`: produces ticks (`QuoteEvent`) for every symbol any client
//!   asked for and broadcasts them to all sessions via `crossbeam_channel` senders.
//! - `QuoteReceiver`: accepts TCP connections and hands them to the main loop.
//! - Per-client session: a thread per client that performs the WebSocket handshake,
//!   answers `subscribe`/`unsubscribe`/`ping` and forwards ticks for subscribed symbols.
//!
//! Concurrency and shutdown:
//! - Crossbeam `select!` multiplexes accepted connections and the Ctrl+C signal.
//! - On shutdown the generator broadcasts `QuoteEvent::Shutdown`; every session sends
//!   a close frame and exits.
//! - Errors in one session are logged and never affect other clients.
//!
//! Protocol (JSON text frames):
//! - client: `{"action":"subscribe","symbol":"AAPL"}`, `{"action":"unsubscribe","symbol":"AAPL"}`,
//!   `{"action":"ping"}`.
//! - server: `{"type":"stock_update","symbol":"AAPL","data":{...}}`, `{"type":"pong","timestamp":"..."}`.
#![warn(missing_docs)]
use crate::args::Args;
use crate::model::LatestQuotes;
use crate::model::quote_generator::{GeneratorRequest, QuoteGenerator};
use crate::receiver::QuoteReceiver;
use crate::session::run_session;
use clap::Parser;
use crossbeam_channel::{bounded, select, unbounded};
use log::{error, info, warn};
use quote_common::QuoteError;
use quote_common::Result;
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;

mod args;
pub mod model;
mod receiver;
mod session;

fn main() -> Result<(), QuoteError> {
    dotenvy::dotenv().ok();
    init_logger();
    let args = Args::parse();

    let receiver = QuoteReceiver::new(&args.bind_addr())?;
    let bound = receiver.local_addr()?;
    let (conn_tx, conn_rx) = unbounded::<TcpStream>();
    thread::spawn(move || {
        if let Err(e) = receiver.accept_loop(conn_tx) {
            error!("Receiver loop failed: {:?}", e);
        };
    });

    let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
    let (generator_tx, generator) =
        QuoteGenerator::start(args.interval(), args.initial_price, Arc::clone(&latest));
    info!("WebSocket server listening on ws://{}", bound);

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| QuoteError::Config(format!("Error setting Ctrl+C handler: {}", e)))?;

    let poll_interval = args.poll_interval();
    loop {
        select! {
            recv(conn_rx) -> msg => match msg {
                Ok(stream) => {
                    let generator_tx = generator_tx.clone();
                    let latest = Arc::clone(&latest);
                    thread::spawn(move || {
                        if let Err(e) = run_session(stream, generator_tx, latest, poll_interval) {
                            warn!("Session ended with error: {}", e);
                        }
                    });
                }
                Err(_) => {
                    error!("Acceptor stopped; shutting down");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                info!("Ctrl+C received. Shutting down server...");
                break;
            }
        }
    }

    let _ = generator_tx.send(GeneratorRequest::Shutdown);
    if generator.join().is_err() {
        error!("Generator thread panicked");
    }
    info!("Server stopped");
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
