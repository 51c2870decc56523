//! Relay client seam.
//!
//! The relay-allocation wire protocol is provided by an external library. The
//! session only needs the four operations below, so it depends on this trait
//! and the TURN backend implements it.

use super::error::RelayError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use turnprobe_transport::Transport;

/// Long-term credentials presented to the relay server
#[derive(Clone, PartialEq, Eq)]
pub struct RelayCredentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Authentication realm
    pub realm: String,
}

impl RelayCredentials {
    /// Create credentials from their parts
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: realm.into(),
        }
    }

    /// Parse a `user=pass` pair. Only the first `=` separates the two, so
    /// passwords may contain `=`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] if there is no `=` or the username
    /// is empty.
    pub fn parse(user_pass: &str, realm: &str) -> Result<Self, RelayError> {
        let (username, password) = user_pass.split_once('=').ok_or_else(|| {
            RelayError::InvalidConfig(format!(
                "credentials '{user_pass}' must be a user=pass pair"
            ))
        })?;
        if username.is_empty() {
            return Err(RelayError::InvalidConfig(
                "credentials have an empty username".to_string(),
            ));
        }
        Ok(Self::new(username, password, realm))
    }
}

impl std::fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("realm", &self.realm)
            .finish()
    }
}

/// A started relay client bound to one packet socket.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Start the client's internal message-processing loop
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RelayClientInitFailed`] if the loop cannot start.
    async fn listen(&self) -> Result<(), RelayError>;

    /// Allocate a relay endpoint on the server.
    ///
    /// The returned transport's local address is the relayed transport
    /// address; packets written to it leave the relay server.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AllocationFailed`] if the server refuses.
    async fn allocate(&self) -> Result<Arc<dyn Transport>, RelayError>;

    /// Ask the server which address it sees this client connecting from
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BindingRequestFailed`] if the request fails.
    async fn send_binding_request(&self) -> Result<SocketAddr, RelayError>;

    /// Stop the message-processing loop
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Client`] if the client fails to shut down cleanly.
    async fn close(&self) -> Result<(), RelayError>;
}

/// Builds relay clients over an established packet socket.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Construct a relay client talking to `server` over `transport`.
    ///
    /// The client must not close `transport`; the session owns it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RelayClientInitFailed`] if construction fails.
    async fn connect(
        &self,
        transport: Arc<dyn Transport>,
        server: SocketAddr,
        credentials: &RelayCredentials,
    ) -> Result<Arc<dyn RelayClient>, RelayError>;
}
