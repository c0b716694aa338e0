//! # parley-store
//!
//! Client-side state owned by the synchronization engine: the presence
//! roster and the per-peer conversation logs.  Everything here is plain
//! in-memory state mutated through typed operations; transport and
//! collaborator I/O live elsewhere.

pub mod conversation;
pub mod roster;

pub use conversation::{same_logical_message, ConversationStore, LoadToken};
pub use roster::PresenceRoster;
