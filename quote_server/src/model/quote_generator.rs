//! Quote stream generator and event broadcasting.
//!
//! The `QuoteGenerator` runs a background thread that synthesizes ticks for every
//! symbol any client has asked for and broadcasts them to all registered sessions
//! using `crossbeam_channel`. Sessions register by sending a
//! `GeneratorRequest::Register` with their own `Sender<QuoteEvent>`.
//!
//! Event model:
//! - `QuoteEvent::Tick`: a single tick for one symbol.
//! - `QuoteEvent::Shutdown`: signal for consumers to terminate gracefully.
//!
//! Design notes:
//! - Symbols are reference counted: every session `Track`s a symbol once when it
//!   subscribes and `Untrack`s it on unsubscribe or disconnect. A symbol with no
//!   subscribers left stops ticking and is forgotten.
//! - Maintains last prices per symbol so all clients observe the same
//!   sequence of prices; the latest tick is also published to `LatestQuotes`.
//! - Broadcast is best-effort: if sending to a session fails, that session is removed.

use std::collections::{BTreeMap, HashMap};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use log::{debug, info};
use quote_common::TickData;

use crate::model::LatestQuotes;
use crate::model::quote::generate_tick;

/// Message sent by the generator to its subscribers.
#[derive(Debug, Clone)]
pub enum QuoteEvent {
    /// New tick for a particular symbol.
    Tick {
        /// Upper-case symbol.
        symbol: String,
        /// Generated trade payload.
        data: TickData,
    },
    /// Global shutdown notification for all consumers.
    Shutdown,
}

/// Control messages accepted by the generator thread.
#[derive(Debug)]
pub enum GeneratorRequest {
    /// Add a session to the broadcast list.
    Register(Sender<QuoteEvent>),
    /// One more session subscribed to a symbol.
    Track(String),
    /// One session fewer subscribed to a symbol.
    Untrack(String),
    /// Notify all sessions and stop.
    Shutdown,
}

/// Background market data generator that broadcasts to subscribers.
pub struct QuoteGenerator;

impl QuoteGenerator {
    /// Start the generator thread and return its control channel.
    ///
    /// Every `interval` the generator emits one tick per tracked symbol, stores
    /// it in `latest` and pushes it to all registered sessions.
    pub fn start(
        interval: Duration,
        initial_price: f64,
        latest: LatestQuotes,
    ) -> (Sender<GeneratorRequest>, JoinHandle<()>) {
        let (control_tx, control_rx) = unbounded::<GeneratorRequest>();
        let handle = thread::spawn(move || run(control_rx, interval, initial_price, latest));
        (control_tx, handle)
    }
}

fn run(control: Receiver<GeneratorRequest>, interval: Duration, initial_price: f64, latest: LatestQuotes) {
    let mut clients: Vec<Sender<QuoteEvent>> = Vec::new();
    let mut tracked: BTreeMap<String, usize> = BTreeMap::new();
    let mut current_prices: HashMap<String, f64> = HashMap::new();
    let mut rng = rand::rng();
    let ticker = tick(interval);

    info!(
        "Market generator started (Thread ID: {:?}), interval {:?}",
        thread::current().id(),
        interval
    );

    loop {
        select! {
            recv(control) -> msg => match msg {
                Ok(GeneratorRequest::Register(client_tx)) => {
                    clients.push(client_tx);
                    debug!("Generator: new session added. Total sessions: {}", clients.len());
                }
                Ok(GeneratorRequest::Track(symbol)) => {
                    let subscribers = tracked.entry(symbol.clone()).or_insert(0);
                    *subscribers += 1;
                    if *subscribers == 1 {
                        info!("Generator: now tracking {}", symbol);
                    }
                }
                Ok(GeneratorRequest::Untrack(symbol)) => {
                    if release(&mut tracked, &symbol) {
                        current_prices.remove(&symbol);
                        forget_latest(&latest, &symbol);
                        info!("Generator: stopped tracking {}", symbol);
                    }
                }
                Ok(GeneratorRequest::Shutdown) | Err(_) => {
                    for client in &clients {
                        let _ = client.send(QuoteEvent::Shutdown);
                    }
                    info!("Market generator stopped");
                    return;
                }
            },
            recv(ticker) -> _ => {
                for symbol in tracked.keys() {
                    let current_price = *current_prices.get(symbol).unwrap_or(&initial_price);
                    let data = generate_tick(&mut rng, symbol, current_price);
                    current_prices.insert(symbol.clone(), data.price);

                    match latest.lock() {
                        Ok(mut latest) => {
                            latest.insert(symbol.clone(), data.clone());
                        }
                        Err(poisoned) => {
                            poisoned.into_inner().insert(symbol.clone(), data.clone());
                        }
                    }

                    let event = QuoteEvent::Tick { symbol: symbol.clone(), data };
                    clients.retain(|client_tx| client_tx.send(event.clone()).is_ok());
                }
            },
        }
    }
}

/// Drops one subscriber of `symbol`; `true` when it was the last one.
fn release(tracked: &mut BTreeMap<String, usize>, symbol: &str) -> bool {
    match tracked.get_mut(symbol) {
        Some(subscribers) if *subscribers > 1 => {
            *subscribers -= 1;
            false
        }
        Some(_) => {
            tracked.remove(symbol);
            true
        }
        None => {
            debug!("Generator: untrack for unknown symbol {}", symbol);
            false
        }
    }
}

fn forget_latest(latest: &LatestQuotes, symbol: &str) {
    match latest.lock() {
        Ok(mut latest) => {
            latest.remove(symbol);
        }
        Err(poisoned) => {
            poisoned.into_inner().remove(symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn broadcasts_ticks_for_tracked_symbols_only() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let (control, handle) =
            QuoteGenerator::start(Duration::from_millis(10), 100.0, Arc::clone(&latest));
        let (events_tx, events_rx) = unbounded();
        control.send(GeneratorRequest::Register(events_tx)).unwrap();
        control.send(GeneratorRequest::Track("AAPL".into())).unwrap();

        match events_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            QuoteEvent::Tick { symbol, data } => {
                assert_eq!(symbol, "AAPL");
                assert!((99.0..=101.0).contains(&data.price));
            }
            QuoteEvent::Shutdown => panic!("unexpected shutdown"),
        }
        assert!(latest.lock().unwrap().contains_key("AAPL"));

        control.send(GeneratorRequest::Shutdown).unwrap();
        handle.join().unwrap();
        let rest: Vec<QuoteEvent> = events_rx.try_iter().collect();
        assert!(matches!(rest.last(), Some(QuoteEvent::Shutdown)));
        assert!(rest.iter().all(|event| match event {
            QuoteEvent::Tick { symbol, .. } => symbol == "AAPL",
            QuoteEvent::Shutdown => true,
        }));
    }

    fn ticks_within(events: &Receiver<QuoteEvent>, window: Duration) -> Vec<String> {
        let deadline = std::time::Instant::now() + window;
        let mut symbols = Vec::new();
        while let Ok(event) = events.recv_deadline(deadline) {
            if let QuoteEvent::Tick { symbol, .. } = event {
                symbols.push(symbol);
            }
        }
        symbols
    }

    #[test]
    fn last_untrack_stops_ticks_and_forgets_symbol() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let (control, handle) =
            QuoteGenerator::start(Duration::from_millis(10), 100.0, Arc::clone(&latest));
        let (events_tx, events_rx) = unbounded();
        control.send(GeneratorRequest::Register(events_tx)).unwrap();

        // Two sessions subscribe to MSFT, one to TSLA.
        control.send(GeneratorRequest::Track("MSFT".into())).unwrap();
        control.send(GeneratorRequest::Track("MSFT".into())).unwrap();
        control.send(GeneratorRequest::Track("TSLA".into())).unwrap();
        let ticked = ticks_within(&events_rx, Duration::from_millis(60));
        assert!(ticked.contains(&"MSFT".to_string()));
        assert!(ticked.contains(&"TSLA".to_string()));

        control.send(GeneratorRequest::Untrack("MSFT".into())).unwrap();
        control.send(GeneratorRequest::Untrack("TSLA".into())).unwrap();
        // Let in-flight ticks drain before looking.
        let _ = ticks_within(&events_rx, Duration::from_millis(30));
        let ticked = ticks_within(&events_rx, Duration::from_millis(60));
        assert!(ticked.contains(&"MSFT".to_string()));
        assert!(!ticked.contains(&"TSLA".to_string()));
        assert!(!latest.lock().unwrap().contains_key("TSLA"));

        control.send(GeneratorRequest::Untrack("MSFT".into())).unwrap();
        let _ = ticks_within(&events_rx, Duration::from_millis(30));
        assert!(ticks_within(&events_rx, Duration::from_millis(60)).is_empty());
        assert!(latest.lock().unwrap().is_empty());

        control.send(GeneratorRequest::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn release_counts_down_to_removal() {
        let mut tracked = BTreeMap::new();
        tracked.insert("AAPL".to_string(), 2);
        assert!(!release(&mut tracked, "AAPL"));
        assert!(release(&mut tracked, "AAPL"));
        assert!(tracked.is_empty());
        assert!(!release(&mut tracked, "AAPL"));
    }
}
