use crossbeam_channel::Sender;
use log::{debug, error, info};
use quote_common::QuoteError;
use std::net::{SocketAddr, TcpListener, TcpStream};

/// TCP acceptor for incoming WebSocket clients.
///
/// Binds the listening socket and hands every accepted connection to the main
/// loop through a channel; the WebSocket handshake happens later in the
/// session thread, so a slow or broken client never stalls the acceptor.
pub struct QuoteReceiver {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
}

impl QuoteReceiver {
    /// Bind a new receiver to the provided `bind_addr` (e.g., `localhost:8765`).
    pub fn new(bind_addr: &str) -> Result<Self, QuoteError> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, QuoteError> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking loop that accepts TCP connections and forwards them to `tx`.
    ///
    /// Accept errors only affect the failing client and are logged. The loop
    /// ends when the receiving side of `tx` is dropped.
    pub(crate) fn accept_loop(self, tx: Sender<TcpStream>) -> Result<(), QuoteError> {
        info!("WebSocket server is started on {}", self.local_addr()?);

        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    debug!("client_tcp_addr: {:?}", stream.peer_addr().ok());
                    tx.send(stream)
                        .map_err(|e| QuoteError::ChannelSend(e.to_string()))?;
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        Ok(())
    }
}
