use thiserror::Error;

/// Errors raised while decoding frames and payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unexpected payload for {command}: {reason}")]
    UnexpectedPayload { command: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
