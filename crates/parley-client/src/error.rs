use thiserror::Error;

use parley_net::NetError;

/// Collaborator faults, surfaced to the presentation layer.
///
/// The engine never retries these itself; the affected conversation or
/// roster stays as it was and the caller decides whether to try again.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("History fetch failed: {0}")]
    HistoryFetchFailed(#[source] anyhow::Error),

    #[error("Contact snapshot fetch failed: {0}")]
    SnapshotFetchFailed(#[source] anyhow::Error),
}

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Includes `NotConnected` for a send attempted with no open link.
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    /// Sending requires a resolved session identity; until then composed
    /// messages cannot be attributed.
    #[error("Session identity is not resolved yet")]
    IdentityUnresolved,
}
