use thiserror::Error;

use parley_shared::ProtocolError;

/// Errors produced by the networking layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// A send was attempted with no open connection.  Surfaced to the
    /// caller synchronously; frames are never queued across disconnects.
    #[error("Not connected")]
    NotConnected,

    /// The connection task has shut down and can no longer be reached.
    #[error("Connection task is gone")]
    ChannelClosed,

    /// Transport-level failure.  Absorbed by the reconnection loop, never
    /// fatal to the caller.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Frame encode/decode failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
