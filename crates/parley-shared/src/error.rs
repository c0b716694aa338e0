use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An inbound frame parsed as neither known shape.
    #[error("Malformed inbound frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    /// An outbound frame failed to serialize.
    #[error("Frame serialization failed: {0}")]
    Encode(#[source] serde_json::Error),
}
