//! Error types for a turnprobe run.

use std::time::Duration;
use thiserror::Error;
use turnprobe_discovery::{CoordinatorError, RelayError};
use turnprobe_transport::TransportError;

/// Errors that end a probe run
#[derive(Debug, Error)]
pub enum Error {
    /// Relay session setup or teardown error
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Packet I/O error outside the diagnostic loops
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Address exchange error
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// The peer never published a relay address
    #[error("no peer relay address within {0:?}")]
    PeerTimeout(Duration),

    /// Invalid run configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns true if the error ends the process invocation
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Relay(e) => e.is_fatal(),
            Error::Coordinator(e) => !e.is_transient(),
            Error::Transport(_) | Error::PeerTimeout(_) | Error::InvalidConfig(_) => true,
        }
    }
}

/// Result alias for probe runs
pub type Result<T> = std::result::Result<T, Error>;
