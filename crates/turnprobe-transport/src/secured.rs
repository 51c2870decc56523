//! Secured-stream packet socket.
//!
//! A DTLS session is connection oriented: it has exactly one remote peer and
//! reads and writes carry no address. Relay clients are written against a
//! packet socket instead. `SecuredPacketSocket` bridges the two so the relay
//! client runs unchanged over the secured session:
//!
//! - every read reports the stream's negotiated remote address
//! - the destination passed to a write is accepted and ignored
//! - deadlines and close are enforced by an [`IoGuard`]

use crate::guard::IoGuard;
use crate::transport::{
    AtomicTransportStats, Transport, TransportError, TransportResult, TransportStats,
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// A connection-oriented secured byte stream bound to one remote peer.
///
/// Each `recv` yields one record's worth of application data and each `send`
/// is written as one record, so message boundaries survive the adapter.
#[async_trait]
pub trait SecureStream: Send + Sync {
    /// Read the next application-data record into `buf`
    async fn recv(&self, buf: &mut [u8]) -> TransportResult<usize>;

    /// Write `buf` as one application-data record
    async fn send(&self, buf: &[u8]) -> TransportResult<usize>;

    /// Local address of the underlying socket
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// The peer negotiated at handshake time
    fn remote_addr(&self) -> SocketAddr;

    /// Terminate the session and release the underlying socket
    async fn close(&self) -> TransportResult<()>;
}

/// Packet-socket view of a [`SecureStream`].
///
/// The relay session owns the only instance and closes it once. A second
/// `close` is a no-op rather than a second close of the stream.
pub struct SecuredPacketSocket {
    stream: Arc<dyn SecureStream>,
    remote: SocketAddr,
    guard: IoGuard,
    stats: AtomicTransportStats,
}

impl SecuredPacketSocket {
    /// Wrap an established secured stream
    #[must_use]
    pub fn new(stream: Arc<dyn SecureStream>) -> Self {
        let remote = stream.remote_addr();
        Self {
            stream,
            remote,
            guard: IoGuard::new(),
            stats: AtomicTransportStats::default(),
        }
    }

    /// The fixed peer every read is attributed to
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl std::fmt::Debug for SecuredPacketSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuredPacketSocket")
            .field("remote", &self.remote)
            .field("closed", &self.guard.is_closed())
            .finish()
    }
}

#[async_trait]
impl Transport for SecuredPacketSocket {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if addr != self.remote {
            tracing::trace!(
                "secured socket ignores destination {}, writing to {}",
                addr,
                self.remote
            );
        }
        let result = self.guard.write(self.stream.send(buf)).await;
        self.stats.on_send(&result, |sent| *sent);
        result
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        let result = self
            .guard
            .read(self.stream.recv(buf))
            .await
            .map(|n| (n, self.remote));
        self.stats.on_recv(&result, |(size, _)| *size);
        result
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.stream.local_addr()
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.guard.close() {
            return Ok(());
        }
        tracing::debug!("Closing secured stream to {}", self.remote);
        self.stream.close().await
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

impl From<Arc<dyn SecureStream>> for SecuredPacketSocket {
    fn from(stream: Arc<dyn SecureStream>) -> Self {
        Self::new(stream)
    }
}
