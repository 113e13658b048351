//! Quote kept per symbol in the snapshot.
//!
//! A `Quote` is built from the `data` object of a `stock_update` frame. The
//! `observed_at` field is stamped by the client on receipt, not taken from the
//! frame, so staleness checks do not depend on the server's clock.
use chrono::{DateTime, Duration, Utc};
use quote_common::message::{Exchange, TickData};
use serde::Serialize;

/// Latest known trade for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    /// Last traded price.
    pub price: f64,
    /// Traded size.
    pub size: f64,
    /// Venue reported by the server.
    pub exchange: Exchange,
    /// Local receipt time of the tick.
    pub observed_at: DateTime<Utc>,
    /// Vendor trade time in milliseconds since the UNIX epoch, if the server sent one.
    pub exchange_timestamp: Option<i64>,
}

impl Quote {
    /// Builds a quote from a wire payload received at `observed_at`.
    pub fn from_tick(data: TickData, observed_at: DateTime<Utc>) -> Self {
        Quote {
            price: data.price,
            size: data.size,
            exchange: data.exchange,
            observed_at,
            exchange_timestamp: data.timestamp,
        }
    }

    /// Time elapsed since the tick was received. Zero if `now` is earlier.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.observed_at).max(Duration::zero())
    }

    /// `true` when the quote is older than `max_age` at `now`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > max_age
    }
}
