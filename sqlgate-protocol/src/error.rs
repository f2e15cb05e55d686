//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or message handling.
///
/// Any of these on an incoming stream means the stream is no longer
/// frame-aligned; the connection must be closed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame length prefix: {0:?}")]
    InvalidLength(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid UTF-8 in frame payload")]
    InvalidUtf8,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
