//! Read side shared between the driver thread and the public handle.
//!
//! The driver is the only writer. Readers take short `RwLock` reads and never
//! wait on I/O. Once `terminate` has run every write is ignored, which is what
//! lets `Synchronizer::stop` promise that nothing changes after it returns.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::debug;

use crate::model::{Quote, QuoteSnapshot};
use crate::sync::status::ConnectionStatus;

/// Status changes buffered per watcher.
pub const WATCH_CAPACITY: usize = 64;

/// Snapshot, status and status watchers for one synchronizer.
#[derive(Debug)]
pub struct LiveView {
    quotes: RwLock<QuoteSnapshot>,
    status: RwLock<ConnectionStatus>,
    watchers: Mutex<Vec<Sender<ConnectionStatus>>>,
    terminated: AtomicBool,
}

impl Default for LiveView {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveView {
    /// Empty view in `Idle` status.
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(QuoteSnapshot::new()),
            status: RwLock::new(ConnectionStatus::Idle),
            watchers: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> QuoteSnapshot {
        self.quotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest quote for one symbol.
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Channel that receives every status change from now on.
    ///
    /// At most `WATCH_CAPACITY` changes are buffered; a watcher that falls
    /// further behind misses the newer ones until it drains.
    pub fn watch(&self) -> Receiver<ConnectionStatus> {
        let (tx, rx) = bounded(WATCH_CAPACITY);
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Merge a tick into the snapshot. Returns `false` after termination.
    pub(crate) fn merge(&self, symbol: &str, quote: Quote) -> bool {
        let mut quotes = self.quotes.write().unwrap_or_else(PoisonError::into_inner);
        if self.terminated.load(Ordering::SeqCst) {
            return false;
        }
        let merged = quotes.merge(symbol, quote);
        debug!("{} -> {:.2} x {} @ {}", symbol, merged.price, merged.size, merged.exchange);
        true
    }

    /// Publish a status change and notify watchers.
    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        {
            let mut current = self.status.write().unwrap_or_else(PoisonError::into_inner);
            if *current == status {
                return;
            }
            if self.terminated.load(Ordering::SeqCst) && !status.is_terminated() {
                return;
            }
            *current = status;
        }
        self.notify(status);
    }

    /// Freeze the view: status becomes `Terminated`, later writes are dropped.
    pub(crate) fn terminate(&self) {
        {
            // Both write locks are held so no merge or status write is mid-flight.
            let _quotes = self.quotes.write().unwrap_or_else(PoisonError::into_inner);
            let mut current = self.status.write().unwrap_or_else(PoisonError::into_inner);
            self.terminated.store(true, Ordering::SeqCst);
            if current.is_terminated() {
                return;
            }
            *current = ConnectionStatus::Terminated;
        }
        self.notify(ConnectionStatus::Terminated);
    }

    fn notify(&self, status: ConnectionStatus) {
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|watcher| match watcher.try_send(status) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Status watcher is lagging; dropping {}", status);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}
