//! Shared protocol messages used by client and server.
//!
//! Every frame on the quote stream is a JSON text message. Clients send
//! `ClientAction`s tagged by `action`; the server answers with
//! `ServerMessage`s tagged by `type`. Field names are part of the contract
//! with existing servers and must not change.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::QuoteError;

/// Request sent from a client to the quote server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientAction {
    /// Start streaming updates for `symbol`.
    Subscribe {
        /// Upper-case symbol, e.g. `AAPL`.
        symbol: String,
    },
    /// Stop streaming updates for `symbol`.
    Unsubscribe {
        /// Upper-case symbol, e.g. `AAPL`.
        symbol: String,
    },
    /// Keep-alive request; the server answers with `pong`.
    Ping,
}

impl ClientAction {
    /// Encode the action as a JSON text frame.
    pub fn to_json(&self) -> Result<String, QuoteError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an action received from a client.
    pub fn parse(text: &str) -> Result<Self, QuoteError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Message pushed from the quote server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Latest trade observed for a subscribed symbol.
    StockUpdate {
        /// Symbol the tick belongs to.
        symbol: String,
        /// Trade payload.
        data: TickData,
    },
    /// Reply to a client `ping`.
    Pong {
        /// Server wall-clock time (ISO-8601), informational only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
}

impl ServerMessage {
    /// Encode the message as a JSON text frame.
    pub fn to_json(&self) -> Result<String, QuoteError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a server frame. Unknown `type` tags and missing fields are errors.
    pub fn parse(text: &str) -> Result<Self, QuoteError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Known values of the `type` tag, used to tell unknown tags from
/// malformed payloads when a frame fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    /// `stock_update`
    StockUpdate,
    /// `pong`
    Pong,
}

impl MessageType {
    /// Reads the `type` tag of a raw frame without decoding the rest.
    ///
    /// Returns `None` when the frame is not a JSON object, has no string
    /// `type`, or carries a tag this protocol does not define.
    pub fn of(text: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        let tag = value.get("type")?.as_str()?;
        MessageType::from_str(tag).ok()
    }
}

/// Trade payload carried by a `stock_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickData {
    /// Last traded price.
    pub price: f64,
    /// Traded size.
    #[serde(default)]
    pub size: f64,
    /// Venue, either a name (`NASDAQ`) or a numeric exchange id.
    #[serde(default)]
    pub exchange: Exchange,
    /// Trade time from the data vendor in milliseconds since the UNIX epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Vendor trade condition codes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<i64>,
    /// Server time the payload was refreshed (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Exchange identifier as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Exchange {
    /// Numeric vendor id (e.g. `4`).
    Code(i64),
    /// Venue name (e.g. `NASDAQ`).
    Name(String),
    /// Field absent or `null`.
    #[default]
    Unknown,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Code(code) => f.pad(&code.to_string()),
            Exchange::Name(name) => f.pad(name),
            Exchange::Unknown => f.pad("-"),
        }
    }
}
