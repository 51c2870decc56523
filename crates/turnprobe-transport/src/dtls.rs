//! DTLS session negotiation with the relay server.
//!
//! The handshake itself (certificates, record layer, key exchange) is
//! provided by `webrtc-dtls`. This module only dials, bounds the handshake
//! and exposes the resulting connection as a [`SecureStream`].

use crate::secured::SecureStream;
use crate::transport::{TransportError, TransportResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use webrtc_dtls::config::{Config, ExtendedMasterSecretType};
use webrtc_dtls::conn::DTLSConn;
use webrtc_dtls::crypto::Certificate;
use webrtc_util::Conn;

/// Something that can negotiate a secured stream with a server.
#[async_trait]
pub trait SecureDialer: Send + Sync {
    /// Dial `server` and complete the secure handshake
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::HandshakeFailed`] if the handshake fails or
    /// does not finish in time.
    async fn dial(&self, server: SocketAddr) -> TransportResult<Arc<dyn SecureStream>>;
}

/// DTLS client dialer with a self-signed identity.
///
/// The relay server's certificate is not verified; the session only has to
/// be encrypted, not authenticated, for this diagnostic.
pub struct DtlsDialer {
    certificate: Certificate,
    handshake_timeout: Duration,
}

impl DtlsDialer {
    /// Create a dialer with a freshly generated self-signed certificate
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] if certificate generation fails.
    pub fn new(handshake_timeout: Duration) -> TransportResult<Self> {
        let certificate = Certificate::generate_self_signed(vec!["turnprobe".to_owned()])
            .map_err(|e| TransportError::InvalidConfig(format!("self-signed certificate: {e}")))?;
        Ok(Self::with_certificate(certificate, handshake_timeout))
    }

    /// Create a dialer presenting an existing certificate
    #[must_use]
    pub fn with_certificate(certificate: Certificate, handshake_timeout: Duration) -> Self {
        Self {
            certificate,
            handshake_timeout,
        }
    }

    /// The handshake bound applied by [`dial`](SecureDialer::dial)
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    fn config(&self) -> Config {
        Config {
            certificates: vec![self.certificate.clone()],
            insecure_skip_verify: true,
            extended_master_secret: ExtendedMasterSecretType::Request,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for DtlsDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtlsDialer")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecureDialer for DtlsDialer {
    async fn dial(&self, server: SocketAddr) -> TransportResult<Arc<dyn SecureStream>> {
        let bind: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        socket
            .connect(server)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{server}: {e}")))?;

        tracing::info!(
            "Starting DTLS handshake with {} (timeout {:?})",
            server,
            self.handshake_timeout
        );

        let conn: Arc<dyn Conn + Send + Sync> = Arc::new(socket);
        let handshake = DTLSConn::new(conn, self.config(), true, None);
        let dtls = tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::HandshakeFailed(format!(
                    "no DTLS handshake with {server} within {:?}",
                    self.handshake_timeout
                ))
            })?
            .map_err(|e| TransportError::HandshakeFailed(format!("{server}: {e}")))?;

        tracing::info!("DTLS session established with {}", server);
        Ok(Arc::new(DtlsStream::new(Arc::new(dtls), server)))
    }
}

/// An established DTLS session, viewed as a [`SecureStream`].
pub struct DtlsStream {
    conn: Arc<dyn Conn + Send + Sync>,
    remote: SocketAddr,
}

impl DtlsStream {
    /// Wrap an established DTLS connection to `remote`
    #[must_use]
    pub fn new(conn: Arc<dyn Conn + Send + Sync>, remote: SocketAddr) -> Self {
        Self { conn, remote }
    }
}

fn dtls_error(err: webrtc_util::Error) -> TransportError {
    TransportError::Other(format!("dtls: {err}"))
}

#[async_trait]
impl SecureStream for DtlsStream {
    async fn recv(&self, buf: &mut [u8]) -> TransportResult<usize> {
        self.conn.recv(buf).await.map_err(dtls_error)
    }

    async fn send(&self, buf: &[u8]) -> TransportResult<usize> {
        self.conn.send(buf).await.map_err(dtls_error)
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.conn.local_addr().map_err(dtls_error)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    async fn close(&self) -> TransportResult<()> {
        self.conn.close().await.map_err(dtls_error)
    }
}
