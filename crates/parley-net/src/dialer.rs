//! Transport construction behind a dialing seam.
//!
//! The connection task never touches sockets directly; it asks a [`Dialer`]
//! for an established [`Transport`] of text frames.  Production dials a real
//! WebSocket, tests hand the task an in-memory pair of channels.

use std::future::Future;
use std::pin::Pin;

use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::NetError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = NetError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, NetError>> + Send>>;

/// An established bidirectional channel of text frames.
///
/// The stream ends (without an error item) when the remote side closes.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Dialing seam for the connection task.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, url: &str) -> impl Future<Output = Result<Transport, NetError>> + Send;
}

/// WebSocket dialer backed by tokio-tungstenite.
pub struct WsDialer;

impl Dialer for WsDialer {
    async fn dial(&self, url: &str) -> Result<Transport, NetError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| NetError::Transport(e.to_string()))?;
        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| NetError::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, NetError>(Message::Text(text))));

        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(text)),
                // Pings and pongs are answered by tungstenite itself; a
                // Close frame is followed by the end of the stream.
                Ok(_) => None,
                Err(e) => Some(Err(NetError::Transport(e.to_string()))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
