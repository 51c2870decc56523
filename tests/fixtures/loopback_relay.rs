//! Loopback relay fixture
//!
//! Stands in for a TURN deployment on a single host:
//! - [`RelayServerStub`] is a UDP socket the secured link can be dialed to
//! - [`LoopbackRelay`] is a relay connector whose allocations are plain
//!   loopback UDP sockets, so packets written to an allocation go straight to
//!   the peer and its local address plays the relayed transport address
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnprobe_discovery::{RelayCredentials, RelaySession};
//! use turnprobe_integration_tests::fixtures::{LoopbackRelay, RelayServerStub};
//! use turnprobe_transport::PlainUdpDialer;
//!
//! # async fn example() {
//! let server = RelayServerStub::bind().await;
//! let relay = LoopbackRelay::new();
//! let mut session = RelaySession::new(server.addr(), RelayCredentials::new("u", "p", "pion.ly"));
//! session.establish(&PlainUdpDialer::new(), &relay).await.unwrap();
//! # }
//! ```

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use turnprobe_discovery::{RelayClient, RelayConnector, RelayCredentials, RelayError};
use turnprobe_transport::{AsyncUdpTransport, Transport};

/// A bound UDP socket standing in for the relay server's listening port
pub struct RelayServerStub {
    socket: UdpSocket,
    addr: SocketAddr,
}

impl RelayServerStub {
    /// Bind on an ephemeral loopback port
    ///
    /// # Panics
    ///
    /// Panics if no loopback port can be bound.
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("bind relay server stub");
        let addr = socket.local_addr().expect("relay server stub address");
        Self { socket, addr }
    }

    /// Address to dial
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The underlying socket
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    allocations: AtomicUsize,
    client_closes: AtomicUsize,
}

/// Relay connector producing [`LoopbackRelayClient`]s
#[derive(Clone, Default)]
pub struct LoopbackRelay {
    fail_allocate: Arc<AtomicBool>,
    counters: Arc<Counters>,
    allocated: Arc<Mutex<Vec<Arc<dyn Transport>>>>,
}

impl LoopbackRelay {
    /// Connector whose allocations succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent allocations fail like a 401 from the server
    pub fn fail_allocations(&self, fail: bool) {
        self.fail_allocate.store(fail, Ordering::SeqCst);
    }

    /// Relay clients built so far
    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Successful allocations so far
    pub fn allocations(&self) -> usize {
        self.counters.allocations.load(Ordering::SeqCst)
    }

    /// Allocations whose endpoint has been closed
    pub fn released(&self) -> usize {
        self.allocated
            .lock()
            .map(|all| all.iter().filter(|t| t.is_closed()).count())
            .unwrap_or(0)
    }

    /// Relay clients closed so far
    pub fn client_closes(&self) -> usize {
        self.counters.client_closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayConnector for LoopbackRelay {
    async fn connect(
        &self,
        transport: Arc<dyn Transport>,
        _server: SocketAddr,
        credentials: &RelayCredentials,
    ) -> Result<Arc<dyn RelayClient>, RelayError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Loopback relay client for {}", credentials.username);
        Ok(Arc::new(LoopbackRelayClient {
            link: transport,
            relay: self.clone(),
        }))
    }
}

/// Relay client half of [`LoopbackRelay`]
pub struct LoopbackRelayClient {
    link: Arc<dyn Transport>,
    relay: LoopbackRelay,
}

#[async_trait]
impl RelayClient for LoopbackRelayClient {
    async fn listen(&self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn allocate(&self) -> Result<Arc<dyn Transport>, RelayError> {
        if self.relay.fail_allocate.load(Ordering::SeqCst) {
            return Err(RelayError::Client("401 Unauthorized".to_string()));
        }
        let transport: Arc<dyn Transport> =
            Arc::new(AsyncUdpTransport::bind(([127, 0, 0, 1], 0)).await?);
        self.relay
            .counters
            .allocations
            .fetch_add(1, Ordering::SeqCst);
        if let Ok(mut all) = self.relay.allocated.lock() {
            all.push(Arc::clone(&transport));
        }
        Ok(transport)
    }

    async fn send_binding_request(&self) -> Result<SocketAddr, RelayError> {
        self.link
            .local_addr()
            .map_err(|e| RelayError::BindingRequestFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), RelayError> {
        self.relay
            .counters
            .client_closes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
