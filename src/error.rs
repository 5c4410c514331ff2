//! Unified error handling for the refbase crate
//!
//! Domain errors live next to their modules; this enum wraps them so
//! callers crossing module boundaries can carry a single error type.
//!
//! Note that [`Unreachable`] is only an error in the type-system sense:
//! during startup it is the expected "no primary instance running" signal
//! and drives role selection instead of being reported.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::remote::client::Unreachable;
pub use crate::remote::coordinator::CoordinatorError;
pub use crate::remote::listener::ListenerError;
pub use crate::remote::protocol::ProtocolError;

/// Unified error type for the refbase crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed wire messages
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No primary instance reachable (expected during startup)
    #[error("no primary instance: {0}")]
    Unreachable(#[from] Unreachable),

    /// Listener startup failures
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    /// Role selection failures
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the failure is contained or retryable rather than fatal.
    ///
    /// Per-connection failures (`Protocol`, `Unreachable`, transient I/O)
    /// never take the process down; only role-selection and configuration
    /// failures are fatal at startup.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::Unreachable(_) => true,
            Self::Io(_) => true,
            Self::Listener(_) => false,
            Self::Coordinator(_) => false,
            Self::Config(_) => false,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_is_recoverable() {
        let err = Error::from(Unreachable::Timeout(std::time::Duration::from_secs(1)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_protocol_error_is_recoverable() {
        let err = Error::from(ProtocolError::Empty);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_config_error_is_fatal() {
        let err = Error::config("remote port must be non-zero");
        assert!(!err.is_recoverable());
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_listener_error_is_fatal() {
        let err = Error::from(ListenerError::BindFailure {
            port: 8786,
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        });
        assert!(!err.is_recoverable());
    }
}
