//! Live quote synchronization for the stock dashboard.
//!
//! The crate keeps one WebSocket subscription to the quote server alive,
//! re-subscribes after every reconnect, and exposes the latest quote per
//! symbol as a snapshot the presentation layer can read at any time.
//!
//! ```no_run
//! use quote_client::config::SyncConfig;
//! use quote_client::sync::Synchronizer;
//!
//! fn main() -> Result<(), quote_common::QuoteError> {
//!     let sync = Synchronizer::new(SyncConfig::default())?;
//!     sync.set_symbols(["AAPL", "MSFT"]);
//!     sync.start();
//!     // ... later, from the UI:
//!     if let Some(quote) = sync.quote("AAPL") {
//!         println!("AAPL {:.2}", quote.price);
//!     }
//!     sync.stop();
//!     Ok(())
//! }
//! ```
//!
//! Modules:
//! - `config`: `SyncConfig` and `BackoffPolicy`.
//! - `model`: quotes, snapshot, subscription set, liveness tracking.
//! - `sync`: the `Synchronizer` handle, its driver and state machine.
//! - `transport`: `Connector` seam and the tungstenite implementation.
//! - `sender`: JSON encoding of outbound actions.
#![warn(missing_docs)]
pub mod config;
pub mod model;
pub mod sender;
pub mod sync;
pub mod transport;

pub use config::{BackoffPolicy, SyncConfig};
pub use model::{Quote, QuoteSnapshot};
pub use sync::{ConnectionStatus, Synchronizer};
