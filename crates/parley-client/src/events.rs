//! Events the engine emits toward the presentation layer.

use parley_shared::types::UserId;

/// Outward notifications.  The presentation layer drains these and
/// re-renders whatever view the event touches; all payload data is
/// available through the engine's accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The session link is open.
    ConnectionUp,
    /// The session link dropped; reconnection is already scheduled.
    ConnectionDown,
    /// Online or offline sets changed.
    RosterChanged,
    /// A history fetch for this peer has started.
    ConversationLoading { peer: UserId },
    /// This peer's conversation reached `Ready`.
    ConversationLoaded { peer: UserId },
    /// An entry was inserted or confirmed in this peer's log.
    MessageAppended { peer: UserId, local_key: String },
}
