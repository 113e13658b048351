//! Sending client actions to the quote server.
//!
//! This module provides a small helper for encoding `ClientAction`s as JSON
//! text frames and queueing them on the current connection.
use log::{debug, info};
use quote_common::QuoteError;
use quote_common::message::ClientAction;

use crate::transport::ConnectionHandle;

/// Helper type for sending actions to the server.
pub struct CommandSender;

impl CommandSender {
    /// Encode `action` and queue it on `connection`.
    pub fn send_action(connection: &ConnectionHandle, action: &ClientAction) -> Result<(), QuoteError> {
        let frame = action.to_json()?;
        match action {
            ClientAction::Ping => debug!("Sending ping on connection #{}", connection.generation()),
            _ => info!("Sending {} on connection #{}", frame, connection.generation()),
        }
        connection.send_text(frame)
    }
}
