//! # parley-client
//!
//! The synchronization engine consumed by a presentation layer.  Wires the
//! connection task, the presence roster, and the conversation store together
//! behind one facade, and translates inbound frames into state changes plus
//! outward [`EngineEvent`]s.
//!
//! This crate has no UI and no CLI surface of its own.

pub mod engine;
pub mod events;

mod error;

pub use engine::{ChatEngine, ContactDirectory, HistoryLoader};
pub use error::{EngineError, LoaderError};
pub use events::EngineEvent;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the default tracing subscriber for a host process.
///
/// Honors `RUST_LOG`; falls back to a chatty filter for the Parley crates
/// and warnings for everything else.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_net=debug,parley_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
