//! Async UDP transport implementation.
//!
//! Native packet-socket variant of the `Transport` trait. The loopback relay
//! fixtures hand it out as a stand-in relayed endpoint. A relay server reached
//! without DTLS goes through [`PlainUdpDialer`](crate::plain::PlainUdpDialer)
//! instead, which keeps the fixed-peer stream shape of the secured path.

use crate::TransportConfig;
use crate::guard::IoGuard;
use crate::transport::{
    AtomicTransportStats, Transport, TransportError, TransportResult, TransportStats,
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;

/// Async UDP transport using Tokio.
///
/// Cloning yields another handle to the same socket; closing any handle closes
/// all of them.
///
/// # Examples
///
/// ```no_run
/// use turnprobe_transport::udp_async::AsyncUdpTransport;
/// use turnprobe_transport::transport::Transport;
/// use std::net::SocketAddr;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: SocketAddr = "127.0.0.1:0".parse()?;
/// let transport = AsyncUdpTransport::bind(addr).await?;
/// println!("Listening on {}", transport.local_addr()?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncUdpTransport {
    socket: Arc<UdpSocket>,
    guard: Arc<IoGuard>,
    stats: Arc<AtomicTransportStats>,
}

impl AsyncUdpTransport {
    /// Create a new async UDP transport bound to the given address with
    /// default buffer sizes.
    ///
    /// # Arguments
    /// * `addr` - The local address to bind to. Use "0.0.0.0:0" for automatic port selection.
    ///
    /// # Errors
    /// Returns `TransportError::BindFailed` if binding fails
    pub async fn bind<A: Into<SocketAddr>>(addr: A) -> TransportResult<Self> {
        Self::bind_with_config(addr, &TransportConfig::default()).await
    }

    /// Create a new async UDP transport with explicit buffer sizes.
    ///
    /// # Errors
    /// Returns `TransportError::BindFailed` if the socket cannot be created or bound
    pub async fn bind_with_config<A: Into<SocketAddr>>(
        addr: A,
        config: &TransportConfig,
    ) -> TransportResult<Self> {
        let addr = addr.into();

        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };

        let socket2 =
            socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))
                .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        socket2
            .set_recv_buffer_size(config.recv_buffer_size)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        socket2
            .set_send_buffer_size(config.send_buffer_size)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        socket2
            .bind(&addr.into())
            .map_err(|e| TransportError::BindFailed(format!("{addr}: {e}")))?;

        socket2
            .set_nonblocking(true)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let std_socket: std::net::UdpSocket = socket2.into();
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        tracing::debug!("UDP transport bound on {}", addr);
        Ok(Self::from_socket(socket))
    }

    /// Create from an existing Tokio UdpSocket.
    ///
    /// # Arguments
    /// * `socket` - An already-bound Tokio UdpSocket
    #[must_use]
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
            guard: Arc::new(IoGuard::new()),
            stats: Arc::new(AtomicTransportStats::default()),
        }
    }
}

#[async_trait]
impl Transport for AsyncUdpTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        let result = self
            .guard
            .write(async { self.socket.send_to(buf, addr).await.map_err(TransportError::from) })
            .await;
        self.stats.on_send(&result, |sent| *sent);
        result
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        let result = self
            .guard
            .read(async { self.socket.recv_from(buf).await.map_err(TransportError::from) })
            .await;
        self.stats.on_recv(&result, |(size, _)| *size);
        result
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    async fn close(&self) -> TransportResult<()> {
        self.guard.close();
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_udp_bind() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let transport = AsyncUdpTransport::bind(addr).await.unwrap();
        let bound_addr = transport.local_addr().unwrap();
        assert_ne!(bound_addr.port(), 0);
        assert!(bound_addr.is_ipv4());
    }

    #[tokio::test]
    async fn test_udp_send_recv() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = AsyncUdpTransport::bind(addr).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = AsyncUdpTransport::bind(addr).await.unwrap();

        let sent = client.send_to(b"Hello world", server_addr).await.unwrap();
        assert_eq!(sent, 11);

        let mut buf = vec![0u8; 1500];
        let (size, from) = timeout(Duration::from_secs(1), server.recv_from(&mut buf))
            .await
            .expect("Timeout")
            .unwrap();

        assert_eq!(size, 11);
        assert_eq!(&buf[..size], b"Hello world");
        assert_eq!(from, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_udp_stats() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = AsyncUdpTransport::bind(addr).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = AsyncUdpTransport::bind(addr).await.unwrap();

        let stats = client.stats();
        assert_eq!(stats.packets_sent, 0);
        assert_eq!(stats.bytes_sent, 0);

        client.send_to(b"Test", server_addr).await.unwrap();

        let stats = client.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_sent, 4);

        let mut buf = vec![0u8; 1500];
        timeout(Duration::from_secs(1), server.recv_from(&mut buf))
            .await
            .expect("Timeout")
            .unwrap();

        let stats = server.stats();
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.bytes_received, 4);
    }

    #[tokio::test]
    async fn test_udp_close() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let transport = AsyncUdpTransport::bind(addr).await.unwrap();

        assert!(!transport.is_closed());
        transport.close().await.unwrap();
        assert!(transport.is_closed());

        let result = transport
            .send_to(b"test", "127.0.0.1:1234".parse().unwrap())
            .await;
        assert!(matches!(result, Err(TransportError::Closed)));
        assert_eq!(transport.stats().send_errors, 1);
    }

    #[tokio::test]
    async fn test_udp_close_unblocks_reader() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let transport = AsyncUdpTransport::bind(addr).await.unwrap();

        let reader = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                transport.recv_from(&mut buf).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.close().await.unwrap();

        let result = timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader still blocked after close")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_udp_read_deadline() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let transport = AsyncUdpTransport::bind(addr).await.unwrap();
        transport.set_read_deadline(Some(Instant::now() + Duration::from_millis(30)));

        let mut buf = vec![0u8; 1500];
        let result = timeout(Duration::from_secs(1), transport.recv_from(&mut buf))
            .await
            .expect("deadline ignored");
        assert!(matches!(result, Err(TransportError::Timeout)));
        assert_eq!(transport.stats().recv_errors, 1);
    }

    #[tokio::test]
    async fn test_udp_large_packet() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = AsyncUdpTransport::bind(addr).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = AsyncUdpTransport::bind(addr).await.unwrap();

        let large_data = vec![0xAA; 1400];
        let sent = client.send_to(&large_data, server_addr).await.unwrap();
        assert_eq!(sent, 1400);

        let mut buf = vec![0u8; 2000];
        let (size, _) = timeout(Duration::from_secs(1), server.recv_from(&mut buf))
            .await
            .expect("Timeout")
            .unwrap();

        assert_eq!(size, 1400);
        assert_eq!(&buf[..size], &large_data[..]);
    }

    #[tokio::test]
    async fn test_udp_ipv6() {
        let addr: SocketAddr = "[::1]:0".parse().unwrap();
        let transport = AsyncUdpTransport::bind(addr).await.unwrap();
        let bound_addr = transport.local_addr().unwrap();

        assert!(bound_addr.is_ipv6());
        assert_ne!(bound_addr.port(), 0);
    }

    #[tokio::test]
    async fn test_udp_from_socket() {
        let std_socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        std_socket.set_nonblocking(true).unwrap();

        let tokio_socket = tokio::net::UdpSocket::from_std(std_socket).unwrap();
        let transport = AsyncUdpTransport::from_socket(tokio_socket);

        assert!(!transport.is_closed());
        let addr = transport.local_addr().unwrap();
        assert!(addr.is_ipv4());
    }

    #[tokio::test]
    async fn test_udp_concurrent_read_and_write() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let a = AsyncUdpTransport::bind(addr).await.unwrap();
        let b = AsyncUdpTransport::bind(addr).await.unwrap();
        let b_addr = b.local_addr().unwrap();
        let a_addr = a.local_addr().unwrap();

        // A blocks in a read while another handle writes
        let reader = {
            let a = a.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 64];
                let (n, from) = a.recv_from(&mut buf).await.unwrap();
                (buf[..n].to_vec(), from)
            })
        };

        a.send_to(b"out", b_addr).await.unwrap();
        let mut buf = vec![0u8; 64];
        let (n, _) = timeout(Duration::from_secs(1), b.recv_from(&mut buf))
            .await
            .expect("Timeout")
            .unwrap();
        assert_eq!(&buf[..n], b"out");

        b.send_to(b"back", a_addr).await.unwrap();
        let (payload, from) = timeout(Duration::from_secs(1), reader)
            .await
            .expect("Timeout")
            .unwrap();
        assert_eq!(payload, b"back");
        assert_eq!(from, b_addr);
    }
}
