//! Rendezvous errors.

/// Errors raised while exchanging relay addresses
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The shared slot could not be read or written
    #[error("Address slot '{key}' unavailable: {reason}")]
    Unavailable {
        /// Slot key
        key: String,
        /// Underlying failure
        reason: String,
    },

    /// A slot value is not a usable `host:port`
    #[error("Invalid peer address '{value}': {reason}")]
    InvalidAddress {
        /// Raw slot value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A well-formed hostname did not resolve
    #[error("Cannot resolve peer address '{value}': {reason}")]
    Unresolved {
        /// Raw slot value
        value: String,
        /// Resolver failure
        reason: String,
    },
}

impl CoordinatorError {
    /// Slot I/O failure for `key`
    pub fn unavailable(key: &str, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Rejected slot value
    pub fn invalid_address(value: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidAddress {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Name resolution failure for `value`
    pub fn unresolved(value: &str, reason: impl std::fmt::Display) -> Self {
        Self::Unresolved {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if retrying on the next poll tick may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Unresolved { .. })
    }
}
