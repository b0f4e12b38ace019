//! Error types for instance-bus

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Election Errors ===
    #[error("Leadership token unavailable: {0}")]
    TokenUnavailable(String),

    // === Protocol Errors ===
    #[error("Malformed handshake: {0}")]
    Handshake(String),

    #[error("Frame too large: declared {declared} bytes, limit is {limit}")]
    FrameTooLarge { declared: u64, limit: u64 },

    // === Lifecycle Errors ===
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Endpoint is closed")]
    EndpointClosed,

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this an error the election loop should absorb and retry?
    ///
    /// Covers the follower-side connect races during leader startup and
    /// teardown: the socket file is not there yet, or the listener is
    /// already gone.
    pub fn is_transient_connect(&self) -> bool {
        match self {
            Error::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            ),
            Error::TokenUnavailable(_) => true,
            _ => false,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_connect_classification() {
        let refused = Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(refused.is_transient_connect());

        let missing = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no socket"));
        assert!(missing.is_transient_connect());

        let denied = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!denied.is_transient_connect());

        assert!(!Error::ConnectionClosed.is_transient_connect());
    }

    #[test]
    fn test_display() {
        let err = Error::FrameTooLarge {
            declared: 1 << 40,
            limit: 1 << 28,
        };
        assert!(err.to_string().contains("Frame too large"));
    }
}
