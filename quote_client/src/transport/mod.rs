//! Transport seam between the synchronizer and the network.
//!
//! A `Connector` opens one connection per call and returns immediately with a
//! `ConnectionHandle`; the blocking I/O happens elsewhere (a reader thread for
//! the WebSocket implementation). Everything the connection observes comes
//! back to the driver as a `TransportSignal` tagged with the connection's
//! generation, so events from a replaced connection can be told apart.
use crossbeam_channel::{Receiver, Sender, unbounded};
use quote_common::QuoteError;

pub mod ws;

pub use ws::WsConnector;

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed; frames can flow.
    Open,
    /// A text frame arrived.
    Message(String),
    /// Connecting, reading or writing failed. Terminal for the connection.
    Error(String),
    /// The connection ended without an error. Terminal for the connection.
    Close,
}

/// A `TransportEvent` tagged with the generation of the connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    /// Connection generation assigned by the state machine.
    pub generation: u64,
    /// What happened.
    pub event: TransportEvent,
}

/// Frame queued for the connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Close the connection and stop reading.
    Close,
}

/// Opens connections to the quote stream.
pub trait Connector: Send + 'static {
    /// Start connection number `generation`, reporting on `events`.
    ///
    /// Must not block. Exactly one terminal event (`Error` or `Close`) is
    /// expected per connection unless the handle is closed first.
    fn connect(&self, generation: u64, events: Sender<TransportSignal>) -> ConnectionHandle;
}

/// Owner-side handle of a live connection.
///
/// Dropping or closing the handle asks the connection to shut down.
#[derive(Debug)]
pub struct ConnectionHandle {
    generation: u64,
    outbound: Sender<Outbound>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiving end its writer drains.
    pub fn new(generation: u64) -> (Self, Receiver<Outbound>) {
        let (outbound, outbound_rx) = unbounded();
        (Self { generation, outbound }, outbound_rx)
    }

    /// Generation of the connection this handle controls.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a text frame.
    pub fn send_text(&self, text: String) -> Result<(), QuoteError> {
        self.outbound.send(Outbound::Text(text)).map_err(|_| {
            QuoteError::ChannelSend(format!("connection #{} already gone", self.generation))
        })
    }

    /// Ask the connection to close. The writer may already be gone.
    pub fn close(self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}
