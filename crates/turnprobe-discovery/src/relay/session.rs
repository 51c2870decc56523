//! Relay session lifecycle.

use super::client::{RelayClient, RelayConnector, RelayCredentials};
use super::error::RelayError;
use super::HELLO_PAYLOAD;
use crate::rendezvous::PeerObserver;
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use turnprobe_transport::{SecureDialer, SecuredPacketSocket, Transport, TransportError};

/// Relay session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing dialed yet
    Disconnected,
    /// Secure handshake with the relay server in progress
    SecureHandshakeInFlight,
    /// Secured socket up, no relay client yet
    SecureEstablished,
    /// Relay client started and listening
    RelayListening,
    /// Relay endpoint allocated
    RelayAllocated,
    /// Torn down
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::SecureHandshakeInFlight => "secure-handshake-in-flight",
            SessionState::SecureEstablished => "secure-established",
            SessionState::RelayListening => "relay-listening",
            SessionState::RelayAllocated => "relay-allocated",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Send the priming packet to `peer` through the relay endpoint.
///
/// The relay installs a forwarding permission for `peer` when it sees this
/// packet leave the allocation.
///
/// # Errors
///
/// Returns [`RelayError::Transport`] if the write fails.
pub async fn prime_peer(relay: &dyn Transport, peer: SocketAddr) -> Result<(), RelayError> {
    relay.send_to(HELLO_PAYLOAD, peer).await?;
    tracing::debug!("Primed relay permission for {}", peer);
    Ok(())
}

/// Re-primes the relay whenever the coordinator observes a new peer address
#[derive(Clone)]
pub struct RelayPrimer {
    relay: Arc<dyn Transport>,
}

impl RelayPrimer {
    /// Prime through `relay`
    #[must_use]
    pub fn new(relay: Arc<dyn Transport>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl PeerObserver for RelayPrimer {
    async fn peer_changed(&self, peer: SocketAddr) {
        if let Err(e) = prime_peer(self.relay.as_ref(), peer).await {
            tracing::warn!("Failed to prime relay for {}: {}", peer, e);
        }
    }
}

/// One secured link to a relay server plus the endpoint allocated on it.
///
/// The session is the only owner allowed to close the secured socket, the
/// relay client and the relay endpoint. Everything else gets shared handles.
pub struct RelaySession {
    server: SocketAddr,
    credentials: RelayCredentials,
    state: SessionState,
    socket: Option<Arc<SecuredPacketSocket>>,
    client: Option<Arc<dyn RelayClient>>,
    relay: Option<Arc<dyn Transport>>,
    relay_addr: Option<SocketAddr>,
}

impl RelaySession {
    /// Create a disconnected session for `server`
    #[must_use]
    pub fn new(server: SocketAddr, credentials: RelayCredentials) -> Self {
        Self {
            server,
            credentials,
            state: SessionState::Disconnected,
            socket: None,
            client: None,
            relay: None,
            relay_addr: None,
        }
    }

    /// Relay server address
    #[must_use]
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Relayed transport address, once allocated
    #[must_use]
    pub fn relay_addr(&self) -> Option<SocketAddr> {
        self.relay_addr
    }

    /// Shared handle to the relay endpoint, once allocated
    #[must_use]
    pub fn relay_transport(&self) -> Option<Arc<dyn Transport>> {
        self.relay.clone()
    }

    /// Shared handle to the secured socket, once connected
    #[must_use]
    pub fn secured_socket(&self) -> Option<Arc<SecuredPacketSocket>> {
        self.socket.clone()
    }

    fn expect_state(&self, expected: SessionState, op: &str) -> Result<(), RelayError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RelayError::InvalidState(format!(
                "{op} requires {expected}, session is {}",
                self.state
            )))
        }
    }

    /// Run the secure handshake with the relay server.
    ///
    /// On failure the session moves to [`SessionState::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HandshakeFailed`] if dialing fails or times out.
    pub async fn connect(&mut self, dialer: &dyn SecureDialer) -> Result<(), RelayError> {
        self.expect_state(SessionState::Disconnected, "connect")?;
        self.state = SessionState::SecureHandshakeInFlight;
        tracing::debug!("Secure handshake with relay server {}", self.server);

        match dialer.dial(self.server).await {
            Ok(stream) => {
                let socket = SecuredPacketSocket::new(stream);
                tracing::info!(
                    "Secured link to {} from {}",
                    self.server,
                    socket
                        .local_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "?".to_string())
                );
                self.socket = Some(Arc::new(socket));
                self.state = SessionState::SecureEstablished;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(match e {
                    TransportError::HandshakeFailed(msg) => RelayError::HandshakeFailed(msg),
                    other => RelayError::HandshakeFailed(other.to_string()),
                })
            }
        }
    }

    /// Build the relay client over the secured socket and start listening
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RelayClientInitFailed`] if the client cannot be
    /// built or started.
    pub async fn start_client(&mut self, connector: &dyn RelayConnector) -> Result<(), RelayError> {
        self.expect_state(SessionState::SecureEstablished, "start_client")?;
        let socket = self
            .socket
            .clone()
            .ok_or_else(|| RelayError::InvalidState("secured socket missing".to_string()))?;

        let client = connector
            .connect(socket, self.server, &self.credentials)
            .await
            .map_err(|e| match e {
                RelayError::RelayClientInitFailed(_) => e,
                other => RelayError::RelayClientInitFailed(other.to_string()),
            })?;
        self.client = Some(Arc::clone(&client));

        client.listen().await.map_err(|e| match e {
            RelayError::RelayClientInitFailed(_) => e,
            other => RelayError::RelayClientInitFailed(other.to_string()),
        })?;
        self.state = SessionState::RelayListening;
        Ok(())
    }

    /// Allocate a relay endpoint and record its address
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AllocationFailed`] if the server refuses.
    pub async fn allocate(&mut self) -> Result<SocketAddr, RelayError> {
        self.expect_state(SessionState::RelayListening, "allocate")?;
        let client = self
            .client
            .clone()
            .ok_or_else(|| RelayError::InvalidState("relay client missing".to_string()))?;

        let relay = client.allocate().await.map_err(|e| match e {
            RelayError::AllocationFailed(_) => e,
            other => RelayError::AllocationFailed(other.to_string()),
        })?;
        self.relay = Some(Arc::clone(&relay));
        let relay_addr = relay
            .local_addr()
            .map_err(|e| RelayError::AllocationFailed(format!("relayed address: {e}")))?;

        tracing::info!("relayed-address={}", relay_addr);
        self.relay_addr = Some(relay_addr);
        self.state = SessionState::RelayAllocated;
        Ok(relay_addr)
    }

    /// Connect, start the relay client and allocate in one go.
    ///
    /// Any failure tears the session down before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first setup error; see [`connect`](Self::connect),
    /// [`start_client`](Self::start_client) and [`allocate`](Self::allocate).
    pub async fn establish(
        &mut self,
        dialer: &dyn SecureDialer,
        connector: &dyn RelayConnector,
    ) -> Result<SocketAddr, RelayError> {
        let result = async {
            self.connect(dialer).await?;
            self.start_client(connector).await?;
            self.allocate().await
        }
        .await;

        if let Err(e) = &result {
            tracing::error!("Relay session setup failed: {}", e);
            if let Err(close_err) = self.close().await {
                tracing::warn!("Teardown after failed setup: {}", close_err);
            }
        }
        result
    }

    /// Ask the relay server for this session's mapped address
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BindingRequestFailed`] if the request fails.
    pub async fn send_binding_request(&self) -> Result<SocketAddr, RelayError> {
        self.expect_state(SessionState::RelayAllocated, "send_binding_request")?;
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| RelayError::InvalidState("relay client missing".to_string()))?;

        let mapped = client.send_binding_request().await.map_err(|e| match e {
            RelayError::BindingRequestFailed(_) => e,
            other => RelayError::BindingRequestFailed(other.to_string()),
        })?;
        tracing::info!("mapped-address={}", mapped);
        Ok(mapped)
    }

    /// Send the priming packet to `peer` through the relay endpoint
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidState`] before allocation or
    /// [`RelayError::Transport`] if the write fails.
    pub async fn prime(&self, peer: SocketAddr) -> Result<(), RelayError> {
        self.expect_state(SessionState::RelayAllocated, "prime")?;
        let relay = self
            .relay
            .as_ref()
            .ok_or_else(|| RelayError::InvalidState("relay endpoint missing".to_string()))?;
        prime_peer(relay.as_ref(), peer).await
    }

    /// Binding request followed by a priming packet to the mapped address.
    ///
    /// Returns the mapped address.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BindingRequestFailed`] or the priming write error.
    pub async fn prime_self(&self) -> Result<SocketAddr, RelayError> {
        let mapped = self.send_binding_request().await?;
        self.prime(mapped).await?;
        Ok(mapped)
    }

    /// Tear the session down.
    ///
    /// Releases the allocation, stops the relay client and closes the secured
    /// socket, in that order. Every step runs even if an earlier one failed;
    /// the first error is returned and all are logged. Calling it again is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error hit during teardown.
    pub async fn close(&mut self) -> Result<(), RelayError> {
        let mut first: Option<RelayError> = None;
        let mut record = |step: &str, err: RelayError| {
            tracing::warn!("Relay session close: {} failed: {}", step, err);
            if first.is_none() {
                first = Some(err);
            }
        };

        if let Some(relay) = self.relay.take() {
            if let Err(e) = relay.close().await {
                record("release allocation", e.into());
            }
        }
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                record("stop relay client", e);
            }
        }
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                record("close secured socket", e.into());
            }
        }

        if self.state != SessionState::Closed {
            tracing::debug!("Relay session to {} closed from {}", self.server, self.state);
        }
        self.state = SessionState::Closed;
        first.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySession")
            .field("server", &self.server)
            .field("credentials", &self.credentials)
            .field("state", &self.state)
            .field("relay_addr", &self.relay_addr)
            .finish_non_exhaustive()
    }
}
