//! # parley-shared
//!
//! Data model and wire protocol shared by every Parley crate.
//!
//! The types here are deliberately plain: identifiers, domain structs, and
//! the JSON frames exchanged with the messaging server.  All state machines
//! live in the crates that own them (`parley-net`, `parley-store`).

pub mod constants;
pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use protocol::{ClientFrame, RosterEntry, ServerFrame, ServerMessage};
pub use types::{
    Contact, ConversationPhase, MessageEntry, MessageOrigin, Presence, SessionUser, User, UserId,
};
