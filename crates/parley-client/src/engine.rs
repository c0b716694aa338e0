//! The synchronization engine facade.
//!
//! [`ChatEngine`] owns the presence roster, the conversation store, and the
//! handle to the connection task, and is the single place where connection
//! events become state mutations.  All mutation is single-threaded and
//! cooperative: each operation runs to completion before the next event is
//! processed, so the only hazards are ordering and duplication across
//! asynchronous sources, and those are handled by the store's token and
//! dedup rules.

use std::future::Future;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_net::{Connection, ConnectionEvent, NetError};
use parley_shared::constants::CHANNEL_CAPACITY;
use parley_shared::protocol::{ClientFrame, ServerFrame, ServerMessage};
use parley_shared::types::{Contact, MessageEntry, MessageOrigin, SessionUser, UserId};
use parley_store::{ConversationStore, LoadToken, PresenceRoster};

use crate::error::{EngineError, LoaderError};
use crate::events::EngineEvent;

/// Supplies the initial message page for a peer.  External collaborator,
/// typically an HTTP client owned by the presentation layer.
pub trait HistoryLoader: Send + Sync + 'static {
    fn load_history(
        &self,
        peer: &UserId,
    ) -> impl Future<Output = Result<Vec<ServerMessage>, LoaderError>> + Send;
}

/// Supplies the full known-account snapshot used to derive offline
/// presence.  External collaborator.
pub trait ContactDirectory: Send + Sync + 'static {
    fn fetch_contacts(&self) -> impl Future<Output = Result<Vec<Contact>, LoaderError>> + Send;
}

/// The realtime synchronization engine.
pub struct ChatEngine<H, C> {
    identity: Option<SessionUser>,
    roster: PresenceRoster,
    store: ConversationStore,
    connection: Connection,
    history: H,
    directory: C,
    selected_peer: Option<UserId>,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl<H, C> ChatEngine<H, C>
where
    H: HistoryLoader,
    C: ContactDirectory,
{
    /// Build an engine around an already-spawned connection handle.
    ///
    /// `identity` may be `None` when the session context has not resolved
    /// yet; see [`set_identity`](Self::set_identity).
    pub fn new(
        connection: Connection,
        history: H,
        directory: C,
        identity: Option<SessionUser>,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut roster = PresenceRoster::new();
        if let Some(user) = &identity {
            roster.set_self(user.id.clone());
        }

        let engine = Self {
            identity,
            roster,
            store: ConversationStore::new(),
            connection,
            history,
            directory,
            selected_peer: None,
            event_tx,
        };
        (engine, event_rx)
    }

    pub fn identity(&self) -> Option<&SessionUser> {
        self.identity.as_ref()
    }

    pub fn roster(&self) -> &PresenceRoster {
        &self.roster
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn selected_peer(&self) -> Option<&UserId> {
        self.selected_peer.as_ref()
    }

    /// Record the session identity once the external context resolves it.
    /// Until this happens every inbound message is treated as foreign.
    pub fn set_identity(&mut self, user: SessionUser) {
        info!(user = %user.id, "session identity resolved");
        self.roster.set_self(user.id.clone());
        self.identity = Some(user);
        self.emit(EngineEvent::RosterChanged);
    }

    /// Ask the connection task to establish the session link.  Idempotent;
    /// the link survives peer switches and reconnects on its own.
    pub async fn connect(&self) -> Result<(), NetError> {
        self.connection.open().await
    }

    /// Tear the session link down for good.
    pub async fn disconnect(&self) -> Result<(), NetError> {
        self.connection.close().await
    }

    /// Refresh the contact snapshot and recompute offline presence.
    pub async fn refresh_contacts(&mut self) -> Result<(), LoaderError> {
        let contacts = self.directory.fetch_contacts().await?;
        self.roster.apply_contact_snapshot(contacts);
        self.emit(EngineEvent::RosterChanged);
        Ok(())
    }

    /// Select `peer` and hydrate its conversation from the history loader.
    ///
    /// Any fetch still in flight for a previously selected peer is logically
    /// cancelled: its completion no longer matches and becomes a no-op.
    pub async fn select_peer(&mut self, peer: UserId) -> Result<(), LoaderError> {
        let token = self.begin_select(peer.clone());
        let result = self.history.load_history(&peer).await;
        self.complete_select(token, result)
    }

    /// First half of [`select_peer`](Self::select_peer): mark the selection
    /// and start the load.  Exposed so a driving loop can run the fetch as
    /// its own event and keep processing other events meanwhile.
    pub fn begin_select(&mut self, peer: UserId) -> LoadToken {
        debug!(peer = %peer, "peer selected");
        self.selected_peer = Some(peer.clone());
        let token = self.store.begin_load(&peer);
        self.emit(EngineEvent::ConversationLoading { peer });
        token
    }

    /// Second half of [`select_peer`](Self::select_peer): apply a resolved
    /// fetch, unless the selection has moved on since the token was issued.
    pub fn complete_select(
        &mut self,
        token: LoadToken,
        result: Result<Vec<ServerMessage>, LoaderError>,
    ) -> Result<(), LoaderError> {
        if self.selected_peer.as_ref() != Some(token.peer()) {
            debug!(peer = %token.peer(), "history fetch resolved after reselection; ignoring");
            return Ok(());
        }

        match result {
            Ok(page) => {
                let entries = page.into_iter().map(entry_from_server).collect();
                if self.store.complete_load(&token, entries) {
                    self.emit(EngineEvent::ConversationLoaded {
                        peer: token.peer().clone(),
                    });
                }
                Ok(())
            }
            Err(e) => {
                self.store.fail_load(&token);
                Err(e)
            }
        }
    }

    /// Send a composed message to `peer`.
    ///
    /// The frame is transmitted first; only an accepted send produces an
    /// optimistic entry.  With no open link this surfaces
    /// [`NetError::NotConnected`] and leaves the log untouched, so the
    /// presentation layer can keep the compose box populated.
    pub async fn send_message(&mut self, peer: &UserId, text: &str) -> Result<String, EngineError> {
        let sender = self
            .identity
            .as_ref()
            .ok_or(EngineError::IdentityUnresolved)?
            .id
            .clone();

        let frame = ClientFrame {
            recipient: peer.clone(),
            text: text.to_string(),
        };
        self.connection.send(frame).await?;

        let local_key = self.store.append_local(peer, sender, text, Utc::now());
        self.emit(EngineEvent::MessageAppended {
            peer: peer.clone(),
            local_key: local_key.clone(),
        });
        Ok(local_key)
    }

    /// Feed one connection event through the engine.
    pub fn apply_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Up => self.emit(EngineEvent::ConnectionUp),
            ConnectionEvent::Down => self.emit(EngineEvent::ConnectionDown),
            ConnectionEvent::Frame(ServerFrame::Presence { online }) => {
                self.roster.apply_online_roster(online);
                self.emit(EngineEvent::RosterChanged);
            }
            ConnectionEvent::Frame(ServerFrame::Message(message)) => {
                self.accept_message(message);
            }
        }
    }

    fn accept_message(&mut self, message: ServerMessage) {
        // Conversations are keyed by the other participant.  Until the
        // session identity resolves, every message counts as foreign and is
        // filed under its sender.
        let peer = match &self.identity {
            Some(me) if message.sender == me.id => message.recipient.clone(),
            _ => message.sender.clone(),
        };

        let entry = entry_from_server(message);
        let local_key = self.store.append_remote(&peer, entry);
        self.emit(EngineEvent::MessageAppended { peer, local_key });
    }

    fn emit(&self, event: EngineEvent) {
        // Notifications must never block or kill the engine.
        if let Err(e) = self.event_tx.try_send(event) {
            warn!(error = %e, "engine event dropped");
        }
    }
}

fn entry_from_server(message: ServerMessage) -> MessageEntry {
    MessageEntry {
        local_key: Uuid::new_v4().to_string(),
        server_id: Some(message.id),
        sender: message.sender,
        recipient: message.recipient,
        text: message.text,
        sent_at: message.timestamp,
        origin: MessageOrigin::Remote,
    }
}
