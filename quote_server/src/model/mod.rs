//! Domain models and utilities for the quote server.
//!
//! This module groups the core data types and helpers used by the WebSocket
//! sessions and the background quote generator:
//! - `quote`: synthetic tick generation.
//! - `quote_generator`: background generator thread and `QuoteEvent` broadcasting.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quote_common::TickData;

pub mod quote;
pub mod quote_generator;

/// Last tick per symbol, shared so new subscribers get data immediately.
pub type LatestQuotes = Arc<Mutex<HashMap<String, TickData>>>;
