//! Live quote synchronizer.
//!
//! A `Synchronizer` keeps one streaming connection to the quote server,
//! subscribes to the symbols the caller asks for, merges ticks into a
//! snapshot and reconnects whenever the connection drops.
//!
//! Internally:
//! - `machine`: the pure state machine (`SyncMachine`) deciding what to do.
//! - `view`: snapshot and status shared with readers (`LiveView`).
//! - `timer`: reconnect and heartbeat timers owned by the driver.
//! - `status`: `ConnectionStatus`.
//!
//! A single driver thread owns the machine and multiplexes caller requests,
//! transport signals and both timers with `crossbeam_channel::select!`. The
//! machine's effects are carried out on that same thread, so there is exactly
//! one writer and no locking beyond the read side of `LiveView`.
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error, info, warn};
use quote_common::QuoteError;

use crate::config::SyncConfig;
use crate::model::{Quote, QuoteSnapshot};
use crate::sender::CommandSender;
use crate::transport::{ConnectionHandle, Connector, TransportSignal, WsConnector};

pub mod machine;
pub mod status;
pub mod timer;
pub mod view;

pub use machine::{Effect, Input, Stamp, SyncMachine};
pub use status::ConnectionStatus;
pub use view::LiveView;

use timer::{HeartbeatTimer, ReconnectTimer};

/// Caller request forwarded to the driver.
#[derive(Debug)]
enum Request {
    Start,
    SetSymbols(Vec<String>),
    Stop,
}

/// Handle to a running synchronizer.
///
/// All methods take `&self` and never block on the network; the handle can be
/// shared behind an `Arc`. Dropping it stops the synchronizer.
pub struct Synchronizer {
    requests: Sender<Request>,
    view: Arc<LiveView>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    /// Synchronizer streaming from `config.url` over WebSocket.
    pub fn new(config: SyncConfig) -> Result<Self, QuoteError> {
        let connector =
            WsConnector::new(config.url.clone(), config.poll_interval, config.connect_timeout);
        Self::with_connector(config, connector)
    }

    /// Synchronizer using a custom transport.
    ///
    /// The driver thread starts immediately in `Idle`; nothing connects until
    /// `start` is called.
    pub fn with_connector<C: Connector>(config: SyncConfig, connector: C) -> Result<Self, QuoteError> {
        config.validate()?;
        let view = Arc::new(LiveView::new());
        let (requests, requests_rx) = unbounded();
        let driver = Driver::new(
            SyncMachine::new(&config, Arc::clone(&view)),
            connector,
            &config,
            requests_rx,
        );
        let handle = thread::Builder::new()
            .name("quote-sync".into())
            .spawn(move || driver.run())?;

        Ok(Self {
            requests,
            view,
            driver: Mutex::new(Some(handle)),
        })
    }

    /// Begin connecting. Idempotent; ignored after `stop`.
    pub fn start(&self) {
        self.request(Request::Start);
    }

    /// Replace the desired symbols.
    ///
    /// New symbols are subscribed right away if the connection is open,
    /// otherwise as soon as it opens. Symbols are normalized to upper case;
    /// invalid ones are logged and skipped.
    pub fn set_symbols<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = symbols
            .into_iter()
            .map(|symbol| symbol.as_ref().to_string())
            .collect();
        self.request(Request::SetSymbols(symbols));
    }

    /// Copy of the latest quote per symbol.
    pub fn snapshot(&self) -> QuoteSnapshot {
        self.view.snapshot()
    }

    /// Latest quote for `symbol`.
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.view.quote(symbol)
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.view.status()
    }

    /// `true` while the stream is open.
    pub fn is_connected(&self) -> bool {
        self.view.status().is_connected()
    }

    /// Receiver notified of every later status change.
    ///
    /// Up to `view::WATCH_CAPACITY` undrained changes are kept.
    pub fn watch_status(&self) -> Receiver<ConnectionStatus> {
        self.view.watch()
    }

    /// Close the connection and stop reconnecting. Terminal.
    ///
    /// Returns once the driver thread has exited: no reconnect fires and
    /// neither snapshot nor status change after this call.
    pub fn stop(&self) {
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(driver) = driver else {
            return;
        };

        self.view.terminate();
        let _ = self.requests.send(Request::Stop);
        if driver.join().is_err() {
            error!("Synchronizer driver thread panicked");
        }
        info!("Synchronizer stopped");
    }

    fn request(&self, request: Request) {
        if let Err(e) = self.requests.send(request) {
            debug!("Synchronizer already stopped; dropping {:?}", e.into_inner());
        }
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Event loop owning the machine, the live connection and the timers.
struct Driver<C> {
    machine: SyncMachine,
    connector: C,
    requests: Receiver<Request>,
    events_tx: Sender<TransportSignal>,
    events_rx: Receiver<TransportSignal>,
    connection: Option<ConnectionHandle>,
    reconnect: ReconnectTimer,
    heartbeat: HeartbeatTimer,
}

impl<C: Connector> Driver<C> {
    fn new(machine: SyncMachine, connector: C, config: &SyncConfig, requests: Receiver<Request>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            machine,
            connector,
            requests,
            events_tx,
            events_rx,
            connection: None,
            reconnect: ReconnectTimer::default(),
            heartbeat: HeartbeatTimer::new(config.heartbeat_interval),
        }
    }

    fn run(mut self) {
        debug!("Synchronizer driver running");
        while !self.machine.status().is_terminated() {
            let input = select! {
                recv(self.requests) -> msg => match msg {
                    Ok(Request::Start) => Some(Input::Start),
                    Ok(Request::SetSymbols(symbols)) => Some(Input::SetSymbols(symbols)),
                    Ok(Request::Stop) | Err(_) => Some(Input::Stop),
                },
                // events_tx lives in self, so this receiver never disconnects.
                recv(self.events_rx) -> msg => msg.ok().map(Input::Transport),
                recv(self.reconnect.receiver()) -> _ => Some(Input::ReconnectDue),
                recv(self.heartbeat.receiver()) -> _ => Some(Input::HeartbeatDue),
            };
            let Some(input) = input else {
                continue;
            };

            if input == Input::ReconnectDue {
                self.reconnect.fired();
            }
            for effect in self.machine.handle(input, Stamp::now()) {
                self.apply(effect);
            }
        }
        debug!("Synchronizer driver exiting");
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Connect { generation } => {
                if let Some(previous) = self.connection.take() {
                    previous.close();
                }
                self.connection = Some(self.connector.connect(generation, self.events_tx.clone()));
            }
            Effect::Send(action) => match &self.connection {
                Some(connection) => {
                    if let Err(e) = CommandSender::send_action(connection, &action) {
                        warn!("Could not queue {:?}: {}", action, e);
                    }
                }
                None => debug!("No connection for {:?}", action),
            },
            Effect::CloseTransport => {
                if let Some(connection) = self.connection.take() {
                    connection.close();
                }
            }
            Effect::ScheduleReconnect(delay) => self.reconnect.schedule(delay),
            Effect::CancelReconnect => self.reconnect.cancel(),
            Effect::StartHeartbeat => self.heartbeat.start(),
            Effect::StopHeartbeat => self.heartbeat.stop(),
        }
    }
}
