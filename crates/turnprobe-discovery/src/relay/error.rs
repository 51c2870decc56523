//! Relay session errors.

use turnprobe_transport::TransportError;

/// Errors raised while establishing, using or tearing down a relay session
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Secure handshake with the relay server failed or timed out
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The relay client could not be constructed or started listening
    #[error("Relay client initialization failed: {0}")]
    RelayClientInitFailed(String),

    /// The relay server refused or never answered the allocation
    #[error("Relay allocation failed: {0}")]
    AllocationFailed(String),

    /// The binding request for the mapped address failed
    #[error("Binding request failed: {0}")]
    BindingRequestFailed(String),

    /// Relay client failure outside the setup steps (e.g. on close)
    #[error("Relay client error: {0}")]
    Client(String),

    /// I/O on the secured socket or the relay endpoint failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Returns true for setup failures that end the process invocation.
    ///
    /// Handshake, relay-client start and allocation failures are never
    /// retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::HandshakeFailed(_)
                | RelayError::RelayClientInitFailed(_)
                | RelayError::AllocationFailed(_)
        )
    }

    /// Returns true if the underlying transport was closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, RelayError::Transport(TransportError::Closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RelayError::HandshakeFailed("x".into()).is_fatal());
        assert!(RelayError::RelayClientInitFailed("x".into()).is_fatal());
        assert!(RelayError::AllocationFailed("x".into()).is_fatal());
        assert!(!RelayError::BindingRequestFailed("x".into()).is_fatal());
        assert!(!RelayError::Transport(TransportError::Timeout).is_fatal());
    }

    #[test]
    fn test_closed_classification() {
        assert!(RelayError::from(TransportError::Closed).is_closed());
        assert!(!RelayError::from(TransportError::Timeout).is_closed());
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::AllocationFailed("401 Unauthorized".into());
        assert_eq!(err.to_string(), "Relay allocation failed: 401 Unauthorized");
    }
}
