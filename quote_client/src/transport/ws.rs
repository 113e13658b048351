//! WebSocket connector built on `tungstenite`.
//!
//! Each connection gets its own reader thread. The thread owns the socket,
//! alternates between draining queued outbound frames and a short blocking
//! read, and reports open/message/error/close back to the driver. It never
//! touches synchronizer state directly.
//!
//! The TCP connect and the handshake are both bounded by the connect timeout;
//! closing the handle while a connection is still opening takes effect once
//! that attempt finishes or times out.
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use quote_common::QuoteError;
use tungstenite::client::IntoClientRequest;
use tungstenite::{HandshakeError, Message, WebSocket};

use super::{ConnectionHandle, Connector, Outbound, TransportEvent, TransportSignal};

type Socket = WebSocket<TcpStream>;

/// How a connection ended when no transport error occurred.
enum Ending {
    /// The server closed the stream.
    Remote,
    /// The owner closed or dropped the handle.
    Local,
    /// Nobody listens for events anymore.
    Abandoned,
}

/// Opens `ws://` connections with one reader thread per connection.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    poll_interval: Duration,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Connector for `url`, reading with `poll_interval` socket timeouts and
    /// giving up on attempts that have not opened within `connect_timeout`.
    pub fn new(url: impl Into<String>, poll_interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            poll_interval,
            connect_timeout,
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, generation: u64, events: Sender<TransportSignal>) -> ConnectionHandle {
        let (handle, outbound) = ConnectionHandle::new(generation);
        let url = self.url.clone();
        let poll_interval = self.poll_interval;
        let connect_timeout = self.connect_timeout;
        let spawn_failure = events.clone();

        let spawned = thread::Builder::new()
            .name(format!("quote-ws-{}", generation))
            .spawn(move || {
                let emit = |event: TransportEvent| {
                    events.send(TransportSignal { generation, event }).is_ok()
                };
                match run_connection(&url, poll_interval, connect_timeout, &outbound, &emit) {
                    Ok(Ending::Remote) => {
                        info!("Connection #{} closed by server", generation);
                        emit(TransportEvent::Close);
                    }
                    Ok(Ending::Local) => {
                        debug!("Connection #{} closed locally", generation);
                        emit(TransportEvent::Close);
                    }
                    Ok(Ending::Abandoned) => {
                        debug!("Connection #{} abandoned", generation);
                    }
                    Err(e) => {
                        warn!("Connection #{} to {} failed: {}", generation, url, e);
                        emit(TransportEvent::Error(e.to_string()));
                    }
                }
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn reader for connection #{}: {}", generation, e);
            let _ = spawn_failure.send(TransportSignal {
                generation,
                event: TransportEvent::Error(e.to_string()),
            });
        }
        handle
    }
}

fn run_connection(
    url: &str,
    poll_interval: Duration,
    connect_timeout: Duration,
    outbound: &Receiver<Outbound>,
    emit: &dyn Fn(TransportEvent) -> bool,
) -> Result<Ending, QuoteError> {
    let mut socket = open_socket(url, connect_timeout)?;
    socket.get_mut().set_read_timeout(Some(poll_interval))?;

    if !emit(TransportEvent::Open) {
        let _ = socket.close(None);
        return Ok(Ending::Abandoned);
    }

    loop {
        loop {
            match outbound.try_recv() {
                Ok(Outbound::Text(text)) => socket.send(Message::Text(text))?,
                Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return Ok(Ending::Local);
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if !emit(TransportEvent::Message(text)) {
                    let _ = socket.close(None);
                    return Ok(Ending::Abandoned);
                }
            }
            Ok(Message::Close(frame)) => {
                debug!("Close frame received: {:?}", frame);
                let _ = socket.flush();
                return Ok(Ending::Remote);
            }
            Ok(other) => debug!("Ignoring non-text frame: {:?}", other),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(Ending::Remote);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// TCP connect and client handshake, each bounded by `timeout`.
fn open_socket(url: &str, timeout: Duration) -> Result<Socket, QuoteError> {
    let request = url.into_client_request()?;
    let host = request
        .uri()
        .host()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| QuoteError::Config(format!("no host in {}", url)))?;
    let port = request.uri().port_u16().unwrap_or(80);

    let mut last_error = None;
    for addr in (host.as_str(), port).to_socket_addrs()? {
        let stream = match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
                continue;
            }
        };
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        return match tungstenite::client(request, stream) {
            Ok((socket, response)) => {
                debug!("Handshake with {} finished: HTTP {}", url, response.status());
                Ok(socket)
            }
            Err(HandshakeError::Failure(e)) => Err(e.into()),
            Err(HandshakeError::Interrupted(_)) => Err(QuoteError::Format(format!(
                "handshake with {} timed out after {:?}",
                url, timeout
            ))),
        };
    }

    Err(match last_error {
        Some(e) => e.into(),
        None => QuoteError::Config(format!("{} resolved to no address", host)),
    })
}
