//! Server error types.

use thiserror::Error;

/// Server errors.
///
/// Most command failures never reach this type: the handler turns them
/// into error replies and the connection keeps going. These are the
/// failures that end a connection or the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] sqlgate_protocol::ProtocolError),

    #[error("server shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));
        assert!(err.to_string().contains("pipe closed"));
        assert_eq!(ServerError::ShuttingDown.to_string(), "server shutting down");
    }
}
