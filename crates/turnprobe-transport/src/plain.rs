//! Unencrypted, peer-bound UDP stream.
//!
//! Lets the relay session reach a relay server over plain UDP through the same
//! [`SecuredPacketSocket`](crate::secured::SecuredPacketSocket) path as DTLS,
//! so session code does not branch on the link type.

use crate::dtls::SecureDialer;
use crate::secured::SecureStream;
use crate::transport::{TransportError, TransportResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;

/// Dialer producing [`UdpStream`]s
#[derive(Debug, Clone, Default)]
pub struct PlainUdpDialer {
    bind: Option<SocketAddr>,
}

impl PlainUdpDialer {
    /// Dial from an ephemeral port on the wildcard address
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial from a fixed local address
    #[must_use]
    pub fn with_bind(bind: SocketAddr) -> Self {
        Self { bind: Some(bind) }
    }
}

#[async_trait]
impl SecureDialer for PlainUdpDialer {
    async fn dial(&self, server: SocketAddr) -> TransportResult<Arc<dyn SecureStream>> {
        let bind = self.bind.unwrap_or_else(|| {
            if server.is_ipv4() {
                SocketAddr::from(([0, 0, 0, 0], 0))
            } else {
                SocketAddr::from(([0u16; 8], 0))
            }
        });
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{bind}: {e}")))?;
        socket
            .connect(server)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{server}: {e}")))?;

        tracing::info!("Plain UDP link to {} (no DTLS)", server);
        Ok(Arc::new(UdpStream::new(socket, server)))
    }
}

/// A UDP socket connected to a single peer.
///
/// Closing drops the socket, releasing its local port once in-flight
/// operations have been abandoned.
pub struct UdpStream {
    socket: Mutex<Option<Arc<UdpSocket>>>,
    local: Option<SocketAddr>,
    remote: SocketAddr,
}

impl UdpStream {
    /// Wrap a socket already connected to `remote`
    #[must_use]
    pub fn new(socket: UdpSocket, remote: SocketAddr) -> Self {
        let local = socket.local_addr().ok();
        Self {
            socket: Mutex::new(Some(Arc::new(socket))),
            local,
            remote,
        }
    }

    fn socket(&self) -> TransportResult<Arc<UdpSocket>> {
        self.socket
            .lock()
            .map_err(|_| TransportError::Other("udp stream lock poisoned".to_string()))?
            .clone()
            .ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl SecureStream for UdpStream {
    async fn recv(&self, buf: &mut [u8]) -> TransportResult<usize> {
        let socket = self.socket()?;
        Ok(socket.recv(buf).await?)
    }

    async fn send(&self, buf: &[u8]) -> TransportResult<usize> {
        let socket = self.socket()?;
        Ok(socket.send(buf).await?)
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.local
            .ok_or_else(|| TransportError::Other("local address unknown".to_string()))
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    async fn close(&self) -> TransportResult<()> {
        self.socket
            .lock()
            .map_err(|_| TransportError::Other("udp stream lock poisoned".to_string()))?
            .take();
        Ok(())
    }
}
