//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] sqlgate_protocol::ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server error: {0}")]
    Server(String),

    #[error("request timeout")]
    Timeout,

    #[error("connection closed by server")]
    Disconnected,

    #[error("unexpected reply for {command}")]
    UnexpectedReply { command: &'static str },
}

impl ClientError {
    /// Returns whether retrying the command could succeed.
    ///
    /// Server errors are not retryable in general: the command reached the
    /// server and was rejected.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout | ClientError::Disconnected
        )
    }
}
