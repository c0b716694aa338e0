// Client-to-server networking layer: one persistent WebSocket per session.

pub mod connection;
pub mod dialer;
pub mod retry;

mod error;

pub use connection::{
    spawn_connection, Connection, ConnectionCommand, ConnectionConfig, ConnectionEvent,
};
pub use dialer::{Dialer, FrameSink, FrameStream, Transport, WsDialer};
pub use error::NetError;
pub use retry::RetryPolicy;
