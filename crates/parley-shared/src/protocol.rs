//! JSON wire frames exchanged with the messaging server.
//!
//! Inbound frames come in two shapes distinguished by field presence: a
//! presence push carries `online`, a message push carries `sender`.  Anything
//! that parses as neither is a [`ProtocolError::MalformedFrame`] and is
//! dropped by the connection task without tearing the link down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::UserId;

/// Client -> server frame.
///
/// The client assigns no message id; the server produces the canonical id
/// and timestamp on persistence and echoes them back in a [`ServerMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientFrame {
    pub recipient: UserId,
    pub text: String,
}

/// One entry of a presence push roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: UserId,
    pub username: String,
}

/// A persisted message delivered by the server, either as a live push or as
/// part of a history page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerMessage {
    pub sender: UserId,
    pub recipient: UserId,
    pub text: String,
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Server -> client frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Full replacement of the online roster.
    Presence { online: Vec<RosterEntry> },
    /// A single persisted message.
    Message(ServerMessage),
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl ServerFrame {
    /// Decode a raw text frame into one of the two known shapes.
    ///
    /// Unknown extra fields are ignored, so boundary stubs (attachments and
    /// the like) do not break older clients.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::MalformedFrame)
    }
}
