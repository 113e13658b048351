//! Connection state machine.
//!
//! `SyncMachine` holds no sockets and no timers. The driver feeds it `Input`s
//! together with the time they happened, and carries out the `Effect`s it
//! returns. All synchronizer semantics live here:
//!
//! - `Idle → Connecting` on `Start`, `Closed → Connecting` on `ReconnectDue`.
//! - `Connecting → Open` on the transport's open event; every desired symbol
//!   is subscribed once and the heartbeat starts.
//! - `Connecting | Open → Closed` on transport error or close (or heartbeat
//!   timeout when enabled); exactly one reconnect is scheduled.
//! - Anything `→ Terminated` on `Stop`; later inputs are ignored.
//!
//! Every connection gets a new generation number. Transport signals carrying
//! another generation belong to a connection that was already replaced and
//! are dropped.
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use quote_common::message::{ClientAction, MessageType, ServerMessage};

use crate::config::{BackoffPolicy, SyncConfig};
use crate::model::Quote;
use crate::model::SubscriptionSet;
use crate::model::liveness::Liveness;
use crate::sync::status::ConnectionStatus;
use crate::sync::view::LiveView;
use crate::transport::{TransportEvent, TransportSignal};

/// When an input happened, on both clocks the machine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// Monotonic time, for liveness.
    pub instant: Instant,
    /// Wall-clock time, for `observed_at`.
    pub wall: DateTime<Utc>,
}

impl Stamp {
    /// The current time.
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Something the machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Caller asked to start connecting.
    Start,
    /// Caller replaced the subscription set.
    SetSymbols(Vec<String>),
    /// A connection reported an event.
    Transport(TransportSignal),
    /// The reconnect delay elapsed.
    ReconnectDue,
    /// The heartbeat interval elapsed.
    HeartbeatDue,
    /// Caller stopped the synchronizer.
    Stop,
}

/// Work the driver must do on the machine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a new connection with this generation.
    Connect {
        /// Generation the connection's signals will carry.
        generation: u64,
    },
    /// Send an action on the current connection.
    Send(ClientAction),
    /// Close and release the current connection, if any.
    CloseTransport,
    /// Arm the reconnect timer.
    ScheduleReconnect(Duration),
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Start the heartbeat ticker.
    StartHeartbeat,
    /// Stop the heartbeat ticker.
    StopHeartbeat,
}

/// Pure connection/subscription/snapshot logic of the synchronizer.
#[derive(Debug)]
pub struct SyncMachine {
    status: ConnectionStatus,
    generation: u64,
    attempts: u32,
    backoff: BackoffPolicy,
    subscriptions: SubscriptionSet,
    liveness: Liveness,
    view: Arc<LiveView>,
}

impl SyncMachine {
    /// New machine in `Idle`, publishing into `view`.
    pub fn new(config: &SyncConfig, view: Arc<LiveView>) -> Self {
        Self {
            status: ConnectionStatus::Idle,
            generation: 0,
            attempts: 0,
            backoff: config.backoff,
            subscriptions: SubscriptionSet::new(),
            liveness: Liveness::new(config.heartbeat_timeout),
            view,
        }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Apply one input and return the effects to carry out, in order.
    pub fn handle(&mut self, input: Input, at: Stamp) -> Vec<Effect> {
        if self.status.is_terminated() {
            debug!("Ignoring {:?} after stop", input);
            return Vec::new();
        }

        match input {
            Input::Start => self.on_start(),
            Input::SetSymbols(symbols) => self.on_set_symbols(symbols),
            Input::Transport(signal) => self.on_transport(signal, at),
            Input::ReconnectDue => self.on_reconnect_due(),
            Input::HeartbeatDue => self.on_heartbeat(at),
            Input::Stop => self.on_stop(),
        }
    }

    fn on_start(&mut self) -> Vec<Effect> {
        if self.status != ConnectionStatus::Idle {
            debug!("Start ignored: already {}", self.status);
            return Vec::new();
        }
        info!("Starting quote synchronizer");
        vec![self.begin_connect()]
    }

    fn on_set_symbols(&mut self, symbols: Vec<String>) -> Vec<Effect> {
        self.subscriptions.replace(symbols);
        info!(
            "Subscription set: {:?}",
            self.subscriptions.desired().iter().collect::<Vec<_>>()
        );
        if self.status != ConnectionStatus::Open {
            debug!("Connection is {}; subscriptions deferred", self.status);
            return Vec::new();
        }

        let mut effects = Vec::new();
        for symbol in self.subscriptions.retired() {
            self.subscriptions.mark_unsubscribed(&symbol);
            effects.push(Effect::Send(ClientAction::Unsubscribe { symbol }));
        }
        effects.extend(self.subscribe_pending());
        effects
    }

    fn on_transport(&mut self, signal: TransportSignal, at: Stamp) -> Vec<Effect> {
        if signal.generation != self.generation {
            debug!(
                "Dropping {:?} from stale connection #{} (current #{})",
                signal.event, signal.generation, self.generation
            );
            return Vec::new();
        }

        match signal.event {
            TransportEvent::Open => self.on_open(at),
            TransportEvent::Message(text) => {
                self.on_message(&text, at);
                Vec::new()
            }
            TransportEvent::Error(reason) => self.on_lost(&reason),
            TransportEvent::Close => self.on_lost("closed"),
        }
    }

    fn on_open(&mut self, at: Stamp) -> Vec<Effect> {
        if self.status != ConnectionStatus::Connecting {
            debug!("Open event ignored in {}", self.status);
            return Vec::new();
        }
        self.set_status(ConnectionStatus::Open);
        self.attempts = 0;
        self.liveness.record(at.instant);
        self.subscriptions.reset();

        let mut effects = vec![Effect::StartHeartbeat];
        effects.extend(self.subscribe_pending());
        effects
    }

    fn on_message(&mut self, text: &str, at: Stamp) {
        if self.status != ConnectionStatus::Open {
            debug!("Message ignored in {}", self.status);
            return;
        }

        match ServerMessage::parse(text) {
            Ok(ServerMessage::StockUpdate { symbol, data }) => {
                self.liveness.record(at.instant);
                let quote = Quote::from_tick(data, at.wall);
                self.view.merge(&symbol, quote);
            }
            Ok(ServerMessage::Pong { timestamp }) => {
                self.liveness.record(at.instant);
                debug!("Pong received (server time {:?})", timestamp);
            }
            Err(e) => match MessageType::of(text) {
                Some(kind) => warn!("Dropping malformed {} message: {}", kind, e),
                None => debug!("Dropping message with unknown type: {}", text),
            },
        }
    }

    fn on_lost(&mut self, reason: &str) -> Vec<Effect> {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Open => {}
            _ => {
                debug!("Ignoring connection loss ({}) in {}", reason, self.status);
                return Vec::new();
            }
        }

        self.attempts = self.attempts.saturating_add(1);
        let delay = self.backoff.delay(self.attempts);
        warn!(
            "Connection #{} lost ({}); reconnecting in {:?} (attempt {})",
            self.generation, reason, delay, self.attempts
        );
        self.set_status(ConnectionStatus::Closed);
        self.liveness.clear();
        vec![
            Effect::StopHeartbeat,
            Effect::CloseTransport,
            Effect::ScheduleReconnect(delay),
        ]
    }

    fn on_reconnect_due(&mut self) -> Vec<Effect> {
        if self.status != ConnectionStatus::Closed {
            debug!("Reconnect timer ignored in {}", self.status);
            return Vec::new();
        }
        vec![self.begin_connect()]
    }

    fn on_heartbeat(&mut self, at: Stamp) -> Vec<Effect> {
        if self.status != ConnectionStatus::Open {
            return Vec::new();
        }
        if self.liveness.is_expired(at.instant) {
            let quiet = self.liveness.quiet_for(at.instant).unwrap_or_default();
            return self.on_lost(&format!("no frames for {:?}", quiet));
        }
        vec![Effect::Send(ClientAction::Ping)]
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        info!("Stopping quote synchronizer");
        self.set_status(ConnectionStatus::Terminated);
        vec![
            Effect::CancelReconnect,
            Effect::StopHeartbeat,
            Effect::CloseTransport,
        ]
    }

    fn begin_connect(&mut self) -> Effect {
        self.generation += 1;
        self.set_status(ConnectionStatus::Connecting);
        info!("Opening connection #{}", self.generation);
        Effect::Connect {
            generation: self.generation,
        }
    }

    fn subscribe_pending(&mut self) -> Vec<Effect> {
        let pending = self.subscriptions.pending();
        let mut effects = Vec::with_capacity(pending.len());
        for symbol in pending {
            self.subscriptions.mark_subscribed(&symbol);
            effects.push(Effect::Send(ClientAction::Subscribe { symbol }));
        }
        effects
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            debug!("Status {} -> {}", self.status, status);
        }
        self.status = status;
        self.view.set_status(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: &str = r#"{"type":"stock_update","symbol":"AAPL","data":{"price":150.0,"size":100,"exchange":"NASDAQ"}}"#;

    fn machine() -> (SyncMachine, Arc<LiveView>) {
        let view = Arc::new(LiveView::new());
        (SyncMachine::new(&SyncConfig::default(), view.clone()), view)
    }

    fn signal(generation: u64, event: TransportEvent) -> Input {
        Input::Transport(TransportSignal { generation, event })
    }

    fn subscribes(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send(ClientAction::Subscribe { symbol }) => Some(symbol.clone()),
                _ => None,
            })
            .collect()
    }

    fn open(machine: &mut SyncMachine, at: Stamp) -> Vec<Effect> {
        let effects = machine.handle(Input::Start, at);
        assert_eq!(effects, vec![Effect::Connect { generation: 1 }]);
        machine.handle(signal(1, TransportEvent::Open), at)
    }

    fn tick_for(symbol: &str, price: f64) -> String {
        format!(
            r#"{{"type":"stock_update","symbol":"{}","data":{{"price":{},"size":1,"exchange":"NASDAQ"}}}}"#,
            symbol, price
        )
    }

    #[test]
    fn start_is_idempotent() {
        let (mut machine, view) = machine();
        let at = Stamp::now();
        assert_eq!(machine.handle(Input::Start, at), vec![Effect::Connect { generation: 1 }]);
        assert!(machine.handle(Input::Start, at).is_empty());
        assert_eq!(view.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn symbols_set_before_start_are_subscribed_on_open() {
        let (mut machine, view) = machine();
        let at = Stamp::now();
        assert!(machine.handle(Input::SetSymbols(vec!["aapl".into(), "msft".into()]), at).is_empty());

        let effects = open(&mut machine, at);
        assert_eq!(effects[0], Effect::StartHeartbeat);
        assert_eq!(subscribes(&effects), vec!["AAPL", "MSFT"]);
        assert!(view.status().is_connected());
    }

    #[test]
    fn adding_a_symbol_while_open_sends_one_subscribe() {
        let (mut machine, _) = machine();
        let at = Stamp::now();
        open(&mut machine, at);

        let first = machine.handle(Input::SetSymbols(vec!["AAPL".into()]), at);
        assert_eq!(first, vec![Effect::Send(ClientAction::Subscribe { symbol: "AAPL".into() })]);

        let second = machine.handle(Input::SetSymbols(vec!["AAPL".into(), "MSFT".into()]), at);
        assert_eq!(second, vec![Effect::Send(ClientAction::Subscribe { symbol: "MSFT".into() })]);
    }

    #[test]
    fn removing_a_symbol_while_open_unsubscribes_it() {
        let (mut machine, _) = machine();
        let at = Stamp::now();
        machine.handle(Input::SetSymbols(vec!["AAPL".into(), "MSFT".into()]), at);
        open(&mut machine, at);

        let effects = machine.handle(Input::SetSymbols(vec!["MSFT".into()]), at);
        assert_eq!(
            effects,
            vec![Effect::Send(ClientAction::Unsubscribe { symbol: "AAPL".into() })]
        );
    }

    #[test]
    fn reconnect_resubscribes_every_symbol_exactly_once() {
        let (mut machine, _) = machine();
        let at = Stamp::now();
        machine.handle(Input::SetSymbols(vec!["AAPL".into(), "MSFT".into()]), at);
        open(&mut machine, at);
        machine.handle(Input::SetSymbols(vec!["AAPL".into(), "MSFT".into(), "TSLA".into()]), at);

        machine.handle(signal(1, TransportEvent::Close), at);
        assert_eq!(machine.handle(Input::ReconnectDue, at), vec![Effect::Connect { generation: 2 }]);
        let effects = machine.handle(signal(2, TransportEvent::Open), at);
        assert_eq!(subscribes(&effects), vec!["AAPL", "MSFT", "TSLA"]);
    }

    #[test]
    fn transport_error_closes_and_schedules_one_reconnect() {
        let (mut machine, view) = machine();
        let at = Stamp::now();
        open(&mut machine, at);

        let effects = machine.handle(signal(1, TransportEvent::Error("reset".into())), at);
        assert_eq!(
            effects,
            vec![
                Effect::StopHeartbeat,
                Effect::CloseTransport,
                Effect::ScheduleReconnect(Duration::from_secs(5)),
            ]
        );
        assert_eq!(view.status(), ConnectionStatus::Closed);

        // The reader's trailing close for the same connection changes nothing.
        assert!(machine.handle(signal(1, TransportEvent::Close), at).is_empty());
    }

    #[test]
    fn failed_open_is_retried() {
        let (mut machine, _) = machine();
        let at = Stamp::now();
        machine.handle(Input::Start, at);
        let effects = machine.handle(signal(1, TransportEvent::Error("refused".into())), at);
        assert!(effects.contains(&Effect::ScheduleReconnect(Duration::from_secs(5))));
        assert_eq!(machine.status(), ConnectionStatus::Closed);
        assert_eq!(machine.handle(Input::ReconnectDue, at), vec![Effect::Connect { generation: 2 }]);
    }

    #[test]
    fn stale_generation_events_are_ignored() {
        let (mut machine, view) = machine();
        let at = Stamp::now();
        open(&mut machine, at);
        machine.handle(signal(1, TransportEvent::Close), at);
        machine.handle(Input::ReconnectDue, at);

        assert!(machine.handle(signal(1, TransportEvent::Open), at).is_empty());
        assert!(machine.handle(signal(1, TransportEvent::Message(TICK.into())), at).is_empty());
        assert_eq!(view.status(), ConnectionStatus::Connecting);
        assert!(view.snapshot().is_empty());
    }

    #[test]
    fn tick_lands_in_snapshot() {
        let (mut machine, view) = machine();
        let at = Stamp::now();
        machine.handle(Input::SetSymbols(vec!["AAPL".into()]), at);
        open(&mut machine, at);

        machine.handle(signal(1, TransportEvent::Message(TICK.into())), at);
        let snapshot = view.snapshot();
        assert_eq!(snapshot["AAPL"].price, 150.0);
        assert_eq!(snapshot["AAPL"].size, 100.0);
        assert_eq!(snapshot["AAPL"].exchange.to_string(), "NASDAQ");
        assert_eq!(snapshot["AAPL"].observed_at, at.wall);
    }

    #[test]
    fn latest_tick_wins_with_non_decreasing_observed_at() {
        let (mut machine, view) = machine();
        let start = Stamp::now();
        open(&mut machine, start);

        let prices = [101.0, 99.5, 100.25, 98.0];
        let mut previous = None;
        for (i, price) in prices.iter().enumerate() {
            let at = Stamp {
                instant: start.instant,
                // Wall clock jumps backwards on the third tick.
                wall: start.wall + chrono::Duration::seconds(if i == 2 { -10 } else { i as i64 }),
            };
            machine.handle(signal(1, TransportEvent::Message(tick_for("MSFT", *price))), at);
            let observed = view.snapshot()["MSFT"].observed_at;
            if let Some(previous) = previous {
                assert!(observed >= previous);
            }
            previous = Some(observed);
        }
        assert_eq!(view.snapshot()["MSFT"].price, 98.0);
    }

    #[test]
    fn garbage_message_changes_nothing() {
        let (mut machine, view) = machine();
        let at = Stamp::now();
        open(&mut machine, at);
        machine.handle(signal(1, TransportEvent::Message(TICK.into())), at);
        let before = view.snapshot();

        for junk in [r#"{"type":"garbage"}"#, "not json", r#"{"type":"stock_update"}"#] {
            let effects = machine.handle(signal(1, TransportEvent::Message(junk.into())), at);
            assert!(effects.is_empty());
        }
        assert_eq!(view.snapshot(), before);
        assert_eq!(view.status(), ConnectionStatus::Open);
    }

    #[test]
    fn heartbeat_pings_while_open_only() {
        let (mut machine, _) = machine();
        let at = Stamp::now();
        assert!(machine.handle(Input::HeartbeatDue, at).is_empty());
        open(&mut machine, at);
        assert_eq!(
            machine.handle(Input::HeartbeatDue, at),
            vec![Effect::Send(ClientAction::Ping)]
        );
    }

    #[test]
    fn heartbeat_timeout_forces_reconnect_when_enabled() {
        let view = Arc::new(LiveView::new());
        let config = SyncConfig::default()
            .with_heartbeat_interval(Duration::from_secs(10))
            .with_heartbeat_timeout(Some(Duration::from_secs(25)));
        let mut machine = SyncMachine::new(&config, view.clone());
        let start = Stamp::now();
        open(&mut machine, start);

        let later = |secs| Stamp {
            instant: start.instant + Duration::from_secs(secs),
            wall: start.wall,
        };
        machine.handle(signal(1, TransportEvent::Message(r#"{"type":"pong"}"#.into())), later(20));
        assert_eq!(machine.handle(Input::HeartbeatDue, later(40)), vec![Effect::Send(ClientAction::Ping)]);

        let effects = machine.handle(Input::HeartbeatDue, later(50));
        assert!(effects.contains(&Effect::CloseTransport));
        assert_eq!(view.status(), ConnectionStatus::Closed);
    }

    #[test]
    fn without_timeout_a_silent_connection_stays_open() {
        let (mut machine, view) = machine();
        let start = Stamp::now();
        open(&mut machine, start);
        let much_later = Stamp {
            instant: start.instant + Duration::from_secs(3600),
            wall: start.wall,
        };
        assert_eq!(
            machine.handle(Input::HeartbeatDue, much_later),
            vec![Effect::Send(ClientAction::Ping)]
        );
        assert!(view.status().is_connected());
    }

    #[test]
    fn exponential_backoff_grows_and_resets_on_open() {
        let view = Arc::new(LiveView::new());
        let config = SyncConfig::default().with_backoff(BackoffPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(4),
        });
        let mut machine = SyncMachine::new(&config, view);
        let at = Stamp::now();
        machine.handle(Input::Start, at);

        let mut delays = Vec::new();
        for generation in 1..=4 {
            let effects = machine.handle(signal(generation, TransportEvent::Error("down".into())), at);
            delays.extend(effects.into_iter().filter_map(|effect| match effect {
                Effect::ScheduleReconnect(delay) => Some(delay.as_secs()),
                _ => None,
            }));
            machine.handle(Input::ReconnectDue, at);
        }
        assert_eq!(delays, vec![1, 2, 4, 4]);

        machine.handle(signal(5, TransportEvent::Open), at);
        let effects = machine.handle(signal(5, TransportEvent::Close), at);
        assert!(effects.contains(&Effect::ScheduleReconnect(Duration::from_secs(1))));
    }

    #[test]
    fn stop_is_terminal() {
        let (mut machine, view) = machine();
        let at = Stamp::now();
        open(&mut machine, at);
        machine.handle(signal(1, TransportEvent::Close), at);

        let effects = machine.handle(Input::Stop, at);
        assert_eq!(
            effects,
            vec![Effect::CancelReconnect, Effect::StopHeartbeat, Effect::CloseTransport]
        );
        assert!(machine.handle(Input::ReconnectDue, at).is_empty());
        assert!(machine.handle(Input::Start, at).is_empty());
        assert!(machine.handle(Input::Stop, at).is_empty());
        assert_eq!(view.status(), ConnectionStatus::Terminated);
    }
}
