//! TURN backend for the relay client seam.
//!
//! `turn::client::Client` speaks the allocation protocol over any
//! `webrtc_util::Conn`. [`ConnBridge`] presents our secured packet socket as
//! such a connection and [`RelayedTransport`] presents the allocated relay
//! endpoint back as a [`Transport`].

use super::client::{RelayClient, RelayConnector, RelayCredentials};
use super::error::RelayError;
use ::turn::client::{Client, ClientConfig};
use async_trait::async_trait;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use turnprobe_transport::{
    AtomicTransportStats, IoGuard, Transport, TransportError, TransportResult, TransportStats,
};
use webrtc_util::Conn;

/// Retransmission timeout handed to the TURN client, in milliseconds
const DEFAULT_RTO_MS: u16 = 200;

fn conn_error(err: TransportError) -> webrtc_util::Error {
    webrtc_util::Error::Other(err.to_string())
}

/// Presents a [`Transport`] to the TURN client as a `webrtc_util::Conn`.
///
/// Closing the bridge leaves the transport open; the relay session closes
/// the secured socket itself, after the client has stopped.
pub struct ConnBridge {
    inner: Arc<dyn Transport>,
}

impl ConnBridge {
    /// Wrap a transport
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Conn for ConnBridge {
    async fn connect(&self, _addr: SocketAddr) -> webrtc_util::Result<()> {
        Err(webrtc_util::Error::Other(
            "connect is not supported on a relay bridge".to_string(),
        ))
    }

    async fn recv(&self, _buf: &mut [u8]) -> webrtc_util::Result<usize> {
        Err(webrtc_util::Error::Other(
            "recv is not supported on a relay bridge, use recv_from".to_string(),
        ))
    }

    async fn recv_from(&self, buf: &mut [u8]) -> webrtc_util::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await.map_err(conn_error)
    }

    async fn send(&self, _buf: &[u8]) -> webrtc_util::Result<usize> {
        Err(webrtc_util::Error::Other(
            "send is not supported on a relay bridge, use send_to".to_string(),
        ))
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> webrtc_util::Result<usize> {
        self.inner.send_to(buf, target).await.map_err(conn_error)
    }

    fn local_addr(&self) -> webrtc_util::Result<SocketAddr> {
        self.inner.local_addr().map_err(conn_error)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn close(&self) -> webrtc_util::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

/// The allocated relay endpoint as a [`Transport`].
///
/// Its local address is the relayed transport address. Closing it releases
/// the allocation on the server.
pub struct RelayedTransport {
    conn: Arc<dyn Conn + Send + Sync>,
    local: SocketAddr,
    guard: IoGuard,
    stats: AtomicTransportStats,
}

impl RelayedTransport {
    /// Wrap an allocated relay connection
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the relayed address is unknown.
    pub fn new(conn: Arc<dyn Conn + Send + Sync>) -> TransportResult<Self> {
        let local = conn
            .local_addr()
            .map_err(|e| TransportError::Other(format!("relayed address: {e}")))?;
        Ok(Self {
            conn,
            local,
            guard: IoGuard::new(),
            stats: AtomicTransportStats::default(),
        })
    }
}

impl std::fmt::Debug for RelayedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayedTransport")
            .field("local", &self.local)
            .field("closed", &self.guard.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for RelayedTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        let result = self
            .guard
            .write(async {
                self.conn
                    .send_to(buf, addr)
                    .await
                    .map_err(|e| TransportError::Other(e.to_string()))
            })
            .await;
        self.stats.on_send(&result, |n| *n);
        result
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        let result = self
            .guard
            .read(async {
                self.conn
                    .recv_from(buf)
                    .await
                    .map_err(|e| TransportError::Other(e.to_string()))
            })
            .await;
        self.stats.on_recv(&result, |(n, _)| *n);
        result
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.local)
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.guard.close() {
            return Ok(());
        }
        self.conn
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("release allocation: {e}")))
    }

    fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.guard.set_read_deadline(deadline);
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.guard.set_write_deadline(deadline);
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}

/// Relay client backed by `turn::client::Client`
pub struct TurnRelayClient {
    client: Client,
    server: SocketAddr,
}

impl TurnRelayClient {
    /// The relay server this client talks to
    #[must_use]
    pub fn server(&self) -> SocketAddr {
        self.server
    }
}

#[async_trait]
impl RelayClient for TurnRelayClient {
    async fn listen(&self) -> Result<(), RelayError> {
        self.client
            .listen()
            .await
            .map_err(|e| RelayError::RelayClientInitFailed(e.to_string()))
    }

    async fn allocate(&self) -> Result<Arc<dyn Transport>, RelayError> {
        let conn = self
            .client
            .allocate()
            .await
            .map_err(|e| RelayError::AllocationFailed(e.to_string()))?;
        let conn: Arc<dyn Conn + Send + Sync> = Arc::new(conn);
        let relayed = RelayedTransport::new(conn)
            .map_err(|e| RelayError::AllocationFailed(e.to_string()))?;
        Ok(Arc::new(relayed))
    }

    async fn send_binding_request(&self) -> Result<SocketAddr, RelayError> {
        self.client
            .send_binding_request()
            .await
            .map_err(|e| RelayError::BindingRequestFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), RelayError> {
        self.client
            .close()
            .await
            .map_err(|e| RelayError::Client(e.to_string()))
    }
}

/// Builds [`TurnRelayClient`]s
#[derive(Debug, Clone)]
pub struct TurnConnector {
    software: String,
    rto_in_ms: u16,
}

impl TurnConnector {
    /// Connector advertising `software` in its requests
    #[must_use]
    pub fn new(software: impl Into<String>) -> Self {
        Self {
            software: software.into(),
            rto_in_ms: DEFAULT_RTO_MS,
        }
    }

    /// Override the retransmission timeout
    #[must_use]
    pub fn with_rto_ms(mut self, rto_in_ms: u16) -> Self {
        self.rto_in_ms = rto_in_ms;
        self
    }
}

impl Default for TurnConnector {
    fn default() -> Self {
        Self::new(concat!("turnprobe/", env!("CARGO_PKG_VERSION")))
    }
}

#[async_trait]
impl RelayConnector for TurnConnector {
    async fn connect(
        &self,
        transport: Arc<dyn Transport>,
        server: SocketAddr,
        credentials: &RelayCredentials,
    ) -> Result<Arc<dyn RelayClient>, RelayError> {
        let config = ClientConfig {
            stun_serv_addr: server.to_string(),
            turn_serv_addr: server.to_string(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            realm: credentials.realm.clone(),
            software: self.software.clone(),
            rto_in_ms: self.rto_in_ms,
            conn: Arc::new(ConnBridge::new(transport)),
            vnet: None,
        };
        let client = Client::new(config)
            .await
            .map_err(|e| RelayError::RelayClientInitFailed(e.to_string()))?;

        tracing::debug!(
            "TURN client for {} as {}@{}",
            server,
            credentials.username,
            credentials.realm
        );
        Ok(Arc::new(TurnRelayClient { client, server }))
    }
}
