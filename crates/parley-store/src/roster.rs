//! Presence roster and offline-contact derivation.
//!
//! The server pushes the complete online set on every presence event; each
//! push replaces the previous set wholesale.  The offline set is never sent
//! by the server: it is derived here as the contact-directory snapshot minus
//! the online set, minus the current user.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use tracing::debug;

use parley_shared::protocol::RosterEntry;
use parley_shared::types::{Contact, Presence, User, UserId};

/// Palette for per-user display colors.  Cosmetic only: colors never feed
/// into identity or ordering logic.
const DISPLAY_COLORS: &[&str] = &[
    "#e57373", "#64b5f6", "#81c784", "#ffd54f", "#ba68c8", "#4db6ac", "#f06292", "#a1887f",
];

/// Authoritative "who is online" state plus the derived offline set.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    self_id: Option<UserId>,
    online: BTreeMap<UserId, String>,
    contacts: BTreeMap<UserId, String>,
    colors: HashMap<UserId, &'static str>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current user's identity.
    ///
    /// May arrive after roster data has already been applied; the own id is
    /// excluded at read time, so a late identity still takes effect.
    pub fn set_self(&mut self, id: UserId) {
        self.self_id = Some(id);
    }

    /// Replace the online set wholesale.
    ///
    /// Never an incremental patch: the server is the source of truth for who
    /// is connected right now.  Applying the same roster twice is a no-op.
    pub fn apply_online_roster(&mut self, entries: Vec<RosterEntry>) {
        for entry in &entries {
            self.ensure_color(&entry.user_id);
        }
        self.online = entries
            .into_iter()
            .map(|e| (e.user_id, e.username))
            .collect();
        debug!(count = self.online.len(), "online roster replaced");
    }

    /// Replace the known-accounts snapshot from the contact directory.
    pub fn apply_contact_snapshot(&mut self, contacts: Vec<Contact>) {
        for contact in &contacts {
            self.ensure_color(&contact.id);
        }
        self.contacts = contacts.into_iter().map(|c| (c.id, c.username)).collect();
        debug!(count = self.contacts.len(), "contact snapshot replaced");
    }

    /// Currently online users, own id excluded.
    pub fn online(&self) -> Vec<User> {
        self.online
            .iter()
            .filter(|(id, _)| !self.is_self(id))
            .map(|(id, name)| User {
                id: id.clone(),
                display_name: name.clone(),
                presence: Presence::Online,
            })
            .collect()
    }

    /// Known contacts that are not online, own id excluded.
    ///
    /// Disjoint from [`online`](Self::online) by construction: any id in the
    /// online set is filtered out of this derivation.
    pub fn offline(&self) -> Vec<User> {
        self.contacts
            .iter()
            .filter(|(id, _)| !self.online.contains_key(*id) && !self.is_self(id))
            .map(|(id, name)| User {
                id: id.clone(),
                display_name: name.clone(),
                presence: Presence::Offline,
            })
            .collect()
    }

    pub fn is_online(&self, id: &UserId) -> bool {
        self.online.contains_key(id)
    }

    /// The display color assigned to `id` this session, if the id has been
    /// seen in any roster or snapshot.
    pub fn display_color(&self, id: &UserId) -> Option<&'static str> {
        self.colors.get(id).copied()
    }

    fn is_self(&self, id: &UserId) -> bool {
        self.self_id.as_ref() == Some(id)
    }

    // Colors are assigned on first sight and stay stable for the session.
    fn ensure_color(&mut self, id: &UserId) {
        if !self.colors.contains_key(id) {
            let pick = rand::thread_rng().gen_range(0..DISPLAY_COLORS.len());
            self.colors.insert(id.clone(), DISPLAY_COLORS[pick]);
        }
    }
}
