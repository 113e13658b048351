//! Synthetic tick generation.
//!
//! Prices follow a small random walk around the previous price. Sizes and the
//! reported venue depend on the symbol: a few liquid names trade larger lots.

use chrono::{SecondsFormat, Utc};
use quote_common::message::{Exchange, TickData};
use rand::Rng;

/// Symbols that get the larger size baseline.
const LIQUID: [&str; 3] = ["AAPL", "MSFT", "TSLA"];
/// Symbols reported as trading on NASDAQ; everything else prints on NYSE.
const NASDAQ_LISTED: [&str; 8] = ["AAPL", "MSFT", "TSLA", "GOOGL", "AMZN", "NVDA", "META", "NFLX"];

/// Calculate the next synthetic price using a small random walk around `current_price`.
///
/// The change is sampled uniformly from the range `[-1%, +1%]` and the result is
/// clamped to a minimum positive value to avoid non-sensical zero/negative prices.
pub fn next_price<R: Rng>(rng: &mut R, current_price: f64) -> f64 {
    let change: f64 = rng.random_range(-0.01..0.01);
    let new_price = current_price * (1.0 + change);
    new_price.max(0.01)
}

/// Generate a new tick for `symbol` using `current_price` as a base.
pub fn generate_tick<R: Rng>(rng: &mut R, symbol: &str, current_price: f64) -> TickData {
    let size = if LIQUID.contains(&symbol) {
        1000 + rng.random_range(0..5000)
    } else {
        100 + rng.random_range(0..1000)
    };
    let exchange = if NASDAQ_LISTED.contains(&symbol) {
        "NASDAQ"
    } else {
        "NYSE"
    };
    let now = Utc::now();

    TickData {
        price: round_cents(next_price(rng, current_price)),
        size: size as f64,
        exchange: Exchange::Name(exchange.to_string()),
        timestamp: Some(now.timestamp_millis()),
        conditions: Vec::new(),
        updated_at: Some(now.to_rfc3339_opts(SecondsFormat::Micros, true)),
    }
}

fn round_cents(price: f64) -> f64 {
    ((price * 100.0).round() / 100.0).max(0.01)
}
