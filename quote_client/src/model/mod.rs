//! Data model owned by the synchronizer.
//!
//! This module groups the in-memory state the live stream feeds:
//! - `quote`: latest observation for one symbol.
//! - `snapshot`: symbol → quote map with last-write-wins merging.
//! - `subscriptions`: desired symbols and what was sent on the current connection.
//! - `liveness`: last-seen tracking for the optional heartbeat timeout.
pub mod liveness;
pub mod quote;
pub mod snapshot;
pub mod subscriptions;

pub use quote::Quote;
pub use snapshot::QuoteSnapshot;
pub use subscriptions::SubscriptionSet;
