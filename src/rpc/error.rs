use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Frame header has no Content-Length")]
    MissingContentLength,

    #[error("Invalid Content-Length value: {0}")]
    InvalidContentLength(String),

    #[error("Stream closed mid-frame")]
    UnexpectedEof,

    #[error("Frame payload is not valid JSON: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Failed to read from stream: {0}")]
    Io(#[from] std::io::Error),
}
