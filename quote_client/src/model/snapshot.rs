//! Symbol → latest quote map.
//!
//! Entries are only ever overwritten, never removed: a symbol that stops
//! ticking keeps its last quote so readers can judge staleness by age.
use std::collections::HashMap;
use std::collections::hash_map::Iter;
use std::ops::Index;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::quote::Quote;

/// Latest known quote per symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QuoteSnapshot {
    quotes: HashMap<String, Quote>,
}

impl QuoteSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the entry for `symbol` (last write wins).
    ///
    /// `observed_at` never moves backwards for a symbol: if the wall clock
    /// stepped back since the previous tick, the previous stamp is kept.
    pub fn merge(&mut self, symbol: &str, mut quote: Quote) -> &Quote {
        if let Some(previous) = self.quotes.get(symbol) {
            if previous.observed_at > quote.observed_at {
                quote.observed_at = previous.observed_at;
            }
        }
        self.quotes.insert(symbol.to_string(), quote);
        &self.quotes[symbol]
    }

    /// Quote for `symbol`, if one was ever received.
    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    /// Number of symbols with at least one tick.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// `true` before the first tick arrives.
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Iterates over `(symbol, quote)` pairs in arbitrary order.
    pub fn iter(&self) -> Iter<'_, String, Quote> {
        self.quotes.iter()
    }

    /// Symbols in ascending order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.quotes.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Symbols whose last tick is older than `max_age`, sorted.
    pub fn stale_symbols(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<&str> {
        let mut stale: Vec<&str> = self
            .quotes
            .iter()
            .filter(|(_, quote)| quote.is_stale(max_age, now))
            .map(|(symbol, _)| symbol.as_str())
            .collect();
        stale.sort_unstable();
        stale
    }
}

impl Index<&str> for QuoteSnapshot {
    type Output = Quote;

    fn index(&self, symbol: &str) -> &Quote {
        &self.quotes[symbol]
    }
}

impl<'a> IntoIterator for &'a QuoteSnapshot {
    type Item = (&'a String, &'a Quote);
    type IntoIter = Iter<'a, String, Quote>;

    fn into_iter(self) -> Self::IntoIter {
        self.quotes.iter()
    }
}
