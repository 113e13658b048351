//! Desired symbols and their per-connection subscribe state.
//!
//! Server-side subscriptions do not survive a reconnect, so the set keeps two
//! views: what the UI wants (`desired`) and what has been sent on the current
//! connection (`sent`). `reset` forgets the latter when a new connection opens.
use std::collections::BTreeSet;

use log::warn;
use quote_common::symbols::normalize_symbol;

/// Symbols the presentation layer wants streamed.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    desired: BTreeSet<String>,
    sent: BTreeSet<String>,
}

impl SubscriptionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the desired symbols. Invalid entries are logged and skipped.
    pub fn replace<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.desired = symbols
            .into_iter()
            .filter_map(|raw| match normalize_symbol(raw.as_ref()) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    warn!("Ignoring symbol: {}", e);
                    None
                }
            })
            .collect();
    }

    /// Desired symbols, sorted.
    pub fn desired(&self) -> &BTreeSet<String> {
        &self.desired
    }

    /// Desired symbols not yet subscribed on the current connection.
    pub fn pending(&self) -> Vec<String> {
        self.desired.difference(&self.sent).cloned().collect()
    }

    /// Symbols subscribed on the current connection that are no longer desired.
    pub fn retired(&self) -> Vec<String> {
        self.sent.difference(&self.desired).cloned().collect()
    }

    /// Records that a subscribe for `symbol` went out.
    pub fn mark_subscribed(&mut self, symbol: &str) {
        self.sent.insert(symbol.to_string());
    }

    /// Records that an unsubscribe for `symbol` went out.
    pub fn mark_unsubscribed(&mut self, symbol: &str) {
        self.sent.remove(symbol);
    }

    /// Forgets everything sent; called when a fresh connection opens.
    pub fn reset(&mut self) {
        self.sent.clear();
    }
}
