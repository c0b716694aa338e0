//! Per-peer ordered message logs with optimistic insert and echo
//! reconciliation.
//!
//! A conversation moves `Empty -> Loading -> Ready`; reselecting its peer
//! moves it back to `Loading` while a fresh history page is fetched.
//! Messages observed before the log is `Ready` are buffered per peer and
//! replayed onto the loaded history, so nothing that arrives during a load
//! round trip is lost.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use parley_shared::constants::DEDUP_WINDOW_MS;
use parley_shared::types::{ConversationPhase, MessageEntry, MessageOrigin, UserId};

/// Identity rule for reconciliation.
///
/// An optimistic local entry and its server echo are one logical message:
/// matching server ids always mean the same message, otherwise equal
/// `(sender, recipient, text)` with timestamps inside the skew window do.
/// The window exists because the optimistic local clock and the server clock
/// are not guaranteed to agree at sub-second granularity.
pub fn same_logical_message(a: &MessageEntry, b: &MessageEntry) -> bool {
    if let (Some(x), Some(y)) = (&a.server_id, &b.server_id) {
        return x == y;
    }
    a.sender == b.sender
        && a.recipient == b.recipient
        && a.text == b.text
        && (a.sent_at - b.sent_at).num_milliseconds().abs() <= DEDUP_WINDOW_MS
}

/// Correlates one history fetch with the `begin_load` that issued it.
///
/// A completion presenting a superseded token is ignored, which is what
/// makes switching peers a logical cancellation of the previous fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadToken {
    peer: UserId,
    seq: u64,
}

impl LoadToken {
    pub fn peer(&self) -> &UserId {
        &self.peer
    }
}

#[derive(Debug, Default)]
struct Conversation {
    phase: ConversationPhase,
    load_seq: u64,
    entries: Vec<MessageEntry>,
    /// Messages observed while not `Ready`, replayed on the next load.
    pending: Vec<MessageEntry>,
}

/// All per-peer conversation logs, keyed by the peer's user id.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<UserId, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, peer: &UserId) -> ConversationPhase {
        self.conversations
            .get(peer)
            .map(|c| c.phase)
            .unwrap_or(ConversationPhase::Empty)
    }

    /// The display log for `peer`, ordered by `sent_at` ascending with ties
    /// in first-observation order.
    pub fn messages(&self, peer: &UserId) -> &[MessageEntry] {
        self.conversations
            .get(peer)
            .map(|c| c.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Start hydrating `peer` from the history loader.
    ///
    /// Any load already in flight for this peer is superseded: its token
    /// will no longer match when it completes.
    pub fn begin_load(&mut self, peer: &UserId) -> LoadToken {
        let conv = self.conversations.entry(peer.clone()).or_default();
        conv.load_seq += 1;
        conv.phase = ConversationPhase::Loading;
        debug!(peer = %peer, seq = conv.load_seq, "history load started");
        LoadToken {
            peer: peer.clone(),
            seq: conv.load_seq,
        }
    }

    /// Apply a resolved history fetch.
    ///
    /// Returns `false`, changing nothing, when `token` no longer matches the
    /// latest `begin_load` for its peer.  Otherwise the log is replaced by
    /// the page, buffered messages are replayed through the dedup rule, and
    /// the conversation becomes `Ready`.
    pub fn complete_load(&mut self, token: &LoadToken, history: Vec<MessageEntry>) -> bool {
        let Some(conv) = self.conversations.get_mut(&token.peer) else {
            return false;
        };
        if conv.load_seq != token.seq || conv.phase != ConversationPhase::Loading {
            debug!(peer = %token.peer, seq = token.seq, "stale history load ignored");
            return false;
        }

        conv.entries.clear();
        for entry in history {
            Self::insert_entry(conv, entry);
        }
        for entry in std::mem::take(&mut conv.pending) {
            Self::insert_entry(conv, entry);
        }
        conv.phase = ConversationPhase::Ready;
        debug!(peer = %token.peer, count = conv.entries.len(), "conversation ready");
        true
    }

    /// Record a failed history fetch.
    ///
    /// The conversation stays in `Loading` with its buffer intact; retrying
    /// is the caller's decision, the store never retries itself.
    pub fn fail_load(&mut self, token: &LoadToken) {
        if let Some(conv) = self.conversations.get(&token.peer) {
            if conv.load_seq == token.seq {
                warn!(peer = %token.peer, "history load failed");
            }
        }
    }

    /// Optimistic insert of a locally composed message.
    ///
    /// Returns the local correlation key of the entry that now represents
    /// the message.  No network round trip is involved; this never blocks
    /// user input on latency.
    pub fn append_local(
        &mut self,
        peer: &UserId,
        sender: UserId,
        text: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> String {
        let entry = MessageEntry {
            local_key: Uuid::new_v4().to_string(),
            server_id: None,
            sender,
            recipient: peer.clone(),
            text: text.into(),
            sent_at,
            origin: MessageOrigin::Local,
        };
        self.insert(peer, entry)
    }

    /// Insert a server-delivered message into `peer`'s log, reconciling it
    /// against an existing entry for the same logical message.
    ///
    /// Returns the local key of the surviving entry.  Messages for peers
    /// that are not loaded are buffered, never dropped.
    pub fn append_remote(&mut self, peer: &UserId, entry: MessageEntry) -> String {
        self.insert(peer, entry)
    }

    fn insert(&mut self, peer: &UserId, entry: MessageEntry) -> String {
        let conv = self.conversations.entry(peer.clone()).or_default();
        match conv.phase {
            ConversationPhase::Ready => Self::insert_entry(conv, entry),
            ConversationPhase::Empty | ConversationPhase::Loading => {
                let key = entry.local_key.clone();
                conv.pending.push(entry);
                key
            }
        }
    }

    fn insert_entry(conv: &mut Conversation, entry: MessageEntry) -> String {
        if let Some(existing) = conv
            .entries
            .iter_mut()
            .find(|e| same_logical_message(e, &entry))
        {
            // Observed twice: keep the original entry and its position,
            // attach the server id once it is known.
            if existing.server_id.is_none() {
                existing.server_id = entry.server_id;
            }
            debug!(key = %existing.local_key, "duplicate message collapsed");
            return existing.local_key.clone();
        }

        let key = entry.local_key.clone();
        let pos = conv
            .entries
            .partition_point(|e| e.sent_at <= entry.sent_at);
        conv.entries.insert(pos, entry);
        key
    }
}
