use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Account identity = opaque server-assigned string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A known account as exposed to the presentation layer.
///
/// Exactly one record exists per account in the roster; the roster owns the
/// collection exclusively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub presence: Presence,
}

/// The current user's identity, supplied by the external session context.
///
/// Read-only from the engine's point of view.  It may resolve late; until it
/// does, every inbound message is treated as foreign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
}

/// One entry of the external contact-directory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub id: UserId,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Where a message entry was first observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Composed locally, inserted optimistically before any server ack.
    Local,
    /// Delivered by the server (live push or history page).
    Remote,
}

/// A single message in a conversation log.
///
/// `local_key` is assigned by the client and never changes; it is the handle
/// the presentation layer uses to correlate a later server confirmation.
/// `server_id` is attached once the server has confirmed persistence; a
/// `Local` entry without one is provisional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEntry {
    pub local_key: String,
    pub server_id: Option<String>,
    pub sender: UserId,
    pub recipient: UserId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub origin: MessageOrigin,
}

impl MessageEntry {
    /// True once the server has confirmed persistence of this entry.
    pub fn is_confirmed(&self) -> bool {
        self.server_id.is_some()
    }
}

/// Lifecycle of one conversation log.
///
/// `Loading -> Ready` on a successful history load; `Ready -> Loading` when
/// the peer is reselected and a fresh fetch begins.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationPhase {
    #[default]
    Empty,
    Loading,
    Ready,
}
