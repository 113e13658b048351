//! One WebSocket client session.
//!
//! `Session` holds the per-client subscription set and turns inbound client
//! actions into replies. `run_session` owns the socket: it alternates between
//! forwarding generator events for subscribed symbols and a short blocking read
//! of client frames, so a quiet client never delays the stream.
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use log::{debug, info, warn};
use quote_common::symbols::normalize_symbol;
use quote_common::{ClientAction, QuoteError, Result, ServerMessage};
use tungstenite::{Message, WebSocket};

use crate::model::LatestQuotes;
use crate::model::quote_generator::{GeneratorRequest, QuoteEvent};

/// Outcome of handling one client frame.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    /// Messages to send back to this client, in order.
    pub messages: Vec<ServerMessage>,
    /// Symbol this session newly subscribed to.
    pub track: Option<String>,
    /// Symbol this session dropped.
    pub untrack: Option<String>,
}

/// Most symbols one client may hold at once.
pub const MAX_SUBSCRIPTIONS: usize = 256;

/// Subscription state of a single connected client.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    subscriptions: HashSet<String>,
}

impl Session {
    /// Empty session for the client at `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            subscriptions: HashSet::new(),
        }
    }

    /// Whether ticks for `symbol` should be forwarded to this client.
    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.subscriptions.contains(symbol)
    }

    /// Decode a text frame and handle it. Invalid JSON and unknown actions are
    /// logged and produce an empty reply.
    pub fn handle_text(&mut self, text: &str, latest: &LatestQuotes) -> Result<Reply> {
        match ClientAction::parse(text) {
            Ok(action) => self.handle_action(action, latest),
            Err(e) => {
                warn!("{}: ignoring invalid message {:?}: {}", self.peer, text, e);
                Ok(Reply::default())
            }
        }
    }

    /// Apply a decoded client action.
    ///
    /// A new subscription is answered right away with the latest known tick
    /// for that symbol, if the generator has produced one.
    pub fn handle_action(&mut self, action: ClientAction, latest: &LatestQuotes) -> Result<Reply> {
        let mut reply = Reply::default();
        match action {
            ClientAction::Subscribe { symbol } => {
                let symbol = match normalize_symbol(&symbol) {
                    Ok(symbol) => symbol,
                    Err(e) => {
                        warn!("{}: ignoring subscribe: {}", self.peer, e);
                        return Ok(reply);
                    }
                };
                if !self.subscriptions.contains(&symbol) {
                    if self.subscriptions.len() >= MAX_SUBSCRIPTIONS {
                        warn!(
                            "{}: ignoring subscribe to {}: {} subscriptions already",
                            self.peer, symbol, MAX_SUBSCRIPTIONS
                        );
                        return Ok(reply);
                    }
                    info!("{}: subscribed to {}", self.peer, symbol);
                    self.subscriptions.insert(symbol.clone());
                    reply.track = Some(symbol.clone());
                }
                if let Some(data) = latest.lock()?.get(&symbol) {
                    reply.messages.push(ServerMessage::StockUpdate {
                        symbol,
                        data: data.clone(),
                    });
                }
            }
            ClientAction::Unsubscribe { symbol } => {
                let Ok(symbol) = normalize_symbol(&symbol) else {
                    debug!("{}: ignoring unsubscribe for {:?}", self.peer, symbol);
                    return Ok(reply);
                };
                if self.subscriptions.remove(&symbol) {
                    info!("{}: unsubscribed from {}", self.peer, symbol);
                    reply.untrack = Some(symbol);
                }
            }
            ClientAction::Ping => {
                debug!("{}: ping", self.peer);
                reply.messages.push(ServerMessage::Pong {
                    timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
                });
            }
        }
        Ok(reply)
    }

    /// Ends the session, returning the symbols it still held.
    pub fn release(self) -> Vec<String> {
        self.subscriptions.into_iter().collect()
    }
}

/// Serve one accepted TCP connection until the client leaves or the server shuts down.
///
/// Whatever the session still subscribes to is untracked on the way out.
pub fn run_session(
    stream: TcpStream,
    generator: Sender<GeneratorRequest>,
    latest: LatestQuotes,
    poll_interval: Duration,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let mut socket = tungstenite::accept(stream)
        .map_err(|e| QuoteError::Format(format!("WebSocket handshake with {} failed: {}", peer, e)))?;
    socket.get_mut().set_read_timeout(Some(poll_interval))?;
    info!("Client connected: {}", peer);

    let (events_tx, events_rx) = unbounded::<QuoteEvent>();
    request(&generator, GeneratorRequest::Register(events_tx))?;

    let mut session = Session::new(peer);
    let served = serve(&mut socket, &mut session, &events_rx, &generator, &latest);
    for symbol in session.release() {
        let _ = generator.send(GeneratorRequest::Untrack(symbol));
    }
    served
}

fn serve(
    socket: &mut WebSocket<TcpStream>,
    session: &mut Session,
    events: &Receiver<QuoteEvent>,
    generator: &Sender<GeneratorRequest>,
    latest: &LatestQuotes,
) -> Result<()> {
    let peer = session.peer;
    loop {
        loop {
            match events.try_recv() {
                Ok(QuoteEvent::Tick { symbol, data }) => {
                    if session.is_subscribed(&symbol) {
                        send(socket, &ServerMessage::StockUpdate { symbol, data })?;
                    }
                }
                Ok(QuoteEvent::Shutdown) | Err(TryRecvError::Disconnected) => {
                    info!("Closing session with {}: server shutting down", peer);
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return Ok(());
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                let reply = session.handle_text(&text, latest)?;
                if let Some(symbol) = reply.track {
                    request(generator, GeneratorRequest::Track(symbol))?;
                }
                if let Some(symbol) = reply.untrack {
                    request(generator, GeneratorRequest::Untrack(symbol))?;
                }
                for message in &reply.messages {
                    send(socket, message)?;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("{} sent a close frame", peer);
            }
            Ok(other) => debug!("{}: ignoring non-text frame: {:?}", peer, other),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                info!("Client disconnected: {}", peer);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn request(generator: &Sender<GeneratorRequest>, request: GeneratorRequest) -> Result<()> {
    generator
        .send(request)
        .map_err(|e| QuoteError::ChannelSend(e.to_string()))
}

fn send(socket: &mut WebSocket<TcpStream>, message: &ServerMessage) -> Result<()> {
    socket.send(Message::Text(message.to_json()?))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote_common::message::{Exchange, TickData};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn latest_with(symbol: &str, price: f64) -> LatestQuotes {
        let mut map = HashMap::new();
        map.insert(
            symbol.to_string(),
            TickData {
                price,
                size: 100.0,
                exchange: Exchange::Name("NASDAQ".into()),
                timestamp: None,
                conditions: Vec::new(),
                updated_at: None,
            },
        );
        Arc::new(Mutex::new(map))
    }

    #[test]
    fn subscribe_upper_cases_and_replays_latest_tick() {
        let latest = latest_with("AAPL", 150.0);
        let mut session = Session::new(peer());
        let reply = session
            .handle_text(r#"{"action":"subscribe","symbol":"aapl"}"#, &latest)
            .unwrap();

        assert!(session.is_subscribed("AAPL"));
        assert_eq!(reply.track.as_deref(), Some("AAPL"));
        match reply.messages.as_slice() {
            [ServerMessage::StockUpdate { symbol, data }] => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(data.price, 150.0);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn subscribe_without_known_tick_only_tracks() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let mut session = Session::new(peer());
        let reply = session
            .handle_action(ClientAction::Subscribe { symbol: "MSFT".into() }, &latest)
            .unwrap();
        assert!(reply.messages.is_empty());
        assert_eq!(reply.track.as_deref(), Some("MSFT"));
    }

    #[test]
    fn unsubscribe_stops_forwarding() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let mut session = Session::new(peer());
        session
            .handle_action(ClientAction::Subscribe { symbol: "TSLA".into() }, &latest)
            .unwrap();
        let reply = session
            .handle_text(r#"{"action":"unsubscribe","symbol":"tsla"}"#, &latest)
            .unwrap();
        assert_eq!(reply.untrack.as_deref(), Some("TSLA"));
        assert!(reply.messages.is_empty());
        assert!(!session.is_subscribed("TSLA"));

        let again = session
            .handle_action(ClientAction::Unsubscribe { symbol: "TSLA".into() }, &latest)
            .unwrap();
        assert_eq!(again, Reply::default());
    }

    #[test]
    fn repeated_subscribe_tracks_once_and_replays_again() {
        let latest = latest_with("AAPL", 150.0);
        let mut session = Session::new(peer());
        let action = ClientAction::Subscribe { symbol: "AAPL".into() };
        assert!(session.handle_action(action.clone(), &latest).unwrap().track.is_some());

        let reply = session.handle_action(action, &latest).unwrap();
        assert_eq!(reply.track, None);
        assert_eq!(reply.messages.len(), 1);
        assert_eq!(session.release(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn invalid_symbols_are_not_tracked() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let mut session = Session::new(peer());
        for raw in ["", "   ", "DROP TABLE", "A_VERY_LONG_SYMBOL_NAME"] {
            let reply = session
                .handle_action(ClientAction::Subscribe { symbol: raw.into() }, &latest)
                .unwrap();
            assert_eq!(reply, Reply::default(), "{:?}", raw);
        }
        assert!(session.release().is_empty());
    }

    #[test]
    fn subscriptions_are_capped_per_session() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let mut session = Session::new(peer());
        for n in 0..MAX_SUBSCRIPTIONS + 10 {
            let _ = session
                .handle_action(ClientAction::Subscribe { symbol: format!("S{}", n) }, &latest)
                .unwrap();
        }
        assert_eq!(session.release().len(), MAX_SUBSCRIPTIONS);
    }

    #[test]
    fn ping_gets_timestamped_pong() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let mut session = Session::new(peer());
        let reply = session.handle_text(r#"{"action":"ping"}"#, &latest).unwrap();
        assert!(matches!(
            reply.messages.as_slice(),
            [ServerMessage::Pong { timestamp: Some(_) }]
        ));
    }

    #[test]
    fn garbage_and_unknown_actions_are_ignored() {
        let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
        let mut session = Session::new(peer());
        assert_eq!(session.handle_text("not json", &latest).unwrap(), Reply::default());
        assert_eq!(
            session.handle_text(r#"{"action":"dance"}"#, &latest).unwrap(),
            Reply::default()
        );
    }

    fn read_message(client: &mut WebSocket<TcpStream>) -> ServerMessage {
        loop {
            match client.read().unwrap() {
                Message::Text(text) => return ServerMessage::parse(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[test]
    fn serves_replay_ticks_and_pong_over_websocket() {
        use std::net::TcpListener;
        use std::thread;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let latest = latest_with("AAPL", 150.0);
        let (generator_tx, generator_rx) = unbounded();
        let server = {
            let latest = Arc::clone(&latest);
            thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                run_session(stream, generator_tx, latest, Duration::from_millis(10))
            })
        };

        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let (mut client, _) = match tungstenite::client(format!("ws://{}", addr), stream) {
            Ok(pair) => pair,
            Err(e) => panic!("handshake failed: {}", e),
        };

        let events = match generator_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            GeneratorRequest::Register(events) => events,
            other => panic!("unexpected request: {:?}", other),
        };

        client
            .send(Message::Text(r#"{"action":"subscribe","symbol":"aapl"}"#.into()))
            .unwrap();
        match read_message(&mut client) {
            ServerMessage::StockUpdate { symbol, data } => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(data.price, 150.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(
            generator_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            GeneratorRequest::Track(symbol) if symbol == "AAPL"
        ));

        // Only subscribed symbols are forwarded.
        let mut tick = latest.lock().unwrap()["AAPL"].clone();
        tick.price = 151.0;
        events
            .send(QuoteEvent::Tick { symbol: "MSFT".into(), data: tick.clone() })
            .unwrap();
        events
            .send(QuoteEvent::Tick { symbol: "AAPL".into(), data: tick })
            .unwrap();
        match read_message(&mut client) {
            ServerMessage::StockUpdate { symbol, data } => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(data.price, 151.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        client.send(Message::Text(r#"{"action":"ping"}"#.into())).unwrap();
        assert!(matches!(
            read_message(&mut client),
            ServerMessage::Pong { timestamp: Some(_) }
        ));

        client.close(None).unwrap();
        while client.read().is_ok() {}
        assert!(server.join().unwrap().is_ok());
        assert!(matches!(
            generator_rx.try_recv().unwrap(),
            GeneratorRequest::Untrack(symbol) if symbol == "AAPL"
        ));
    }

    #[test]
    fn shutdown_event_closes_the_client() {
        use std::net::TcpListener;
        use std::thread;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (generator_tx, generator_rx) = unbounded();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let latest: LatestQuotes = Arc::new(Mutex::new(HashMap::new()));
            run_session(stream, generator_tx, latest, Duration::from_millis(10))
        });

        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let (mut client, _) = match tungstenite::client(format!("ws://{}", addr), stream) {
            Ok(pair) => pair,
            Err(e) => panic!("handshake failed: {}", e),
        };
        let Ok(GeneratorRequest::Register(events)) =
            generator_rx.recv_timeout(Duration::from_secs(2))
        else {
            panic!("session did not register");
        };

        events.send(QuoteEvent::Shutdown).unwrap();
        assert!(matches!(client.read(), Ok(Message::Close(_))));
        assert!(server.join().unwrap().is_ok());
    }
}
