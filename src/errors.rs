use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the ingestion pipeline's public operations.
///
/// Transient upstream conditions (socket close, heartbeat timeout,
/// malformed frames, batch-entry failures) are handled internally by
/// logging and continuing rather than being represented here — see
/// the error taxonomy in SPEC_FULL.md §7.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid websocket channel: {0}")]
    InvalidChannel(String),

    #[error("invalid numeric value: {0}")]
    InvalidValue(String),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
