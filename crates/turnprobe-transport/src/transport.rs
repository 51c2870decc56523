//! Packet-socket capability shared by every transport variant.
//!
//! The relay client, the echo responder and the pinger are written against the
//! `Transport` trait only. A native UDP socket and a secured, peer-bound stream
//! both satisfy it, so the same relay code runs over either.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport is closed
    #[error("Transport is closed")]
    Closed,

    /// A read or write deadline elapsed
    #[error("Operation timed out")]
    Timeout,

    /// Address binding failed
    #[error("Failed to bind to address: {0}")]
    BindFailed(String),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Secure handshake failed or timed out
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport-specific error
    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Returns true if this error means the transport was closed underneath the caller
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Async packet-socket trait.
///
/// Reads report the sender of each packet and writes name a destination. A
/// variant bound to a single peer reports that peer on every read and ignores
/// the destination on write.
///
/// Deadlines are absolute. Once one passes, pending and future operations in
/// that direction fail with [`TransportError::Timeout`] until the deadline is
/// moved or cleared with `None`.
///
/// # Examples
///
/// ```no_run
/// use turnprobe_transport::transport::Transport;
/// use turnprobe_transport::udp_async::AsyncUdpTransport;
/// use std::net::SocketAddr;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: SocketAddr = "127.0.0.1:40000".parse()?;
/// let transport = AsyncUdpTransport::bind(addr).await?;
///
/// transport.send_to(b"ping", "127.0.0.1:50000".parse()?).await?;
///
/// let mut buf = vec![0u8; 1500];
/// let (size, from) = transport.recv_from(&mut buf).await?;
/// println!("Received {} bytes from {}", size, from);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send data to a remote address.
    ///
    /// # Returns
    /// The number of bytes sent
    ///
    /// # Errors
    /// Returns [`TransportError::Closed`] after close, [`TransportError::Timeout`]
    /// once the write deadline passes, or the underlying I/O failure.
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize>;

    /// Receive one packet.
    ///
    /// Fills `buf` and returns the number of bytes received and the sender's
    /// address.
    ///
    /// # Errors
    /// Returns [`TransportError::Closed`] after close (including a close issued
    /// while this call was pending), [`TransportError::Timeout`] once the read
    /// deadline passes, or the underlying I/O failure.
    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)>;

    /// Get the local address this transport is bound to.
    ///
    /// # Errors
    /// Returns `TransportError` if the address cannot be determined
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Close the transport and release resources.
    ///
    /// After calling this method, all pending and subsequent operations
    /// return `TransportError::Closed`.
    ///
    /// # Errors
    /// Returns `TransportError` if closing the underlying resource fails
    async fn close(&self) -> TransportResult<()>;

    /// Check if the transport is closed.
    fn is_closed(&self) -> bool;

    /// Set both the read and the write deadline.
    fn set_deadline(&self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    /// Set the read deadline. `None` disables it.
    fn set_read_deadline(&self, deadline: Option<Instant>);

    /// Set the write deadline. `None` disables it.
    fn set_write_deadline(&self, deadline: Option<Instant>);

    /// Get transport statistics (optional).
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total packets sent
    pub packets_sent: u64,
    /// Total packets received
    pub packets_received: u64,
    /// Send errors
    pub send_errors: u64,
    /// Receive errors
    pub recv_errors: u64,
}

impl TransportStats {
    /// Create new empty statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful send
    pub fn record_send(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.packets_sent += 1;
    }

    /// Record a successful receive
    pub fn record_recv(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.packets_received += 1;
    }

    /// Record a send error
    pub fn record_send_error(&mut self) {
        self.send_errors += 1;
    }

    /// Record a receive error
    pub fn record_recv_error(&mut self) {
        self.recv_errors += 1;
    }
}

/// Lock-free counters backing [`TransportStats`] for shared transports.
#[derive(Debug, Default)]
pub struct AtomicTransportStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    send_errors: AtomicU64,
    recv_errors: AtomicU64,
}

impl AtomicTransportStats {
    /// Record the outcome of a send
    pub fn on_send<T>(&self, result: &TransportResult<T>, bytes: impl Fn(&T) -> usize) {
        match result {
            Ok(value) => {
                self.bytes_sent
                    .fetch_add(bytes(value) as u64, Ordering::Relaxed);
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.send_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record the outcome of a receive
    pub fn on_recv<T>(&self, result: &TransportResult<T>, bytes: impl Fn(&T) -> usize) {
        match result {
            Ok(value) => {
                self.bytes_received
                    .fetch_add(bytes(value) as u64, Ordering::Relaxed);
                self.packets_received.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.recv_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Take a point-in-time copy of the counters
    #[must_use]
    pub fn snapshot(&self) -> TransportStats {
        TransportStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }
}
