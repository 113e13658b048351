//!
//! Common types and utilities shared by the quote server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `QuoteError` used across the workspace.
//! - `result`: handy `Result<T, QuoteError>` alias.
//! - `symbols`: symbol normalization and symbol-list parsing shared by both sides.
//! - `message`: JSON messages exchanged over the WebSocket stream.
//! - `net`: networking constants and small helpers.
#![warn(missing_docs)]
pub mod error;
pub mod message;
pub mod net;
pub mod result;
pub mod symbols;

pub use error::QuoteError;
pub use message::{ClientAction, ServerMessage, TickData};
pub use result::Result;
