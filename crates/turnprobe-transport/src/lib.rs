//! # turnprobe Transport
//!
//! Packet-socket transport layer for turnprobe.
//!
//! This crate provides:
//! - The [`Transport`](transport::Transport) packet-socket capability used by
//!   the relay client and the diagnostic loops
//! - A native UDP variant ([`AsyncUdpTransport`](udp_async::AsyncUdpTransport))
//! - A secured-stream variant ([`SecuredPacketSocket`](secured::SecuredPacketSocket))
//!   that lets a connection-oriented DTLS session stand in for a packet socket
//! - A DTLS dialer producing the secured stream, and a plain UDP dialer for
//!   relay servers reached without DTLS
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │              relay client / echo / ping                    │
//! │        (depend only on the Transport capability)           │
//! ├─────────────────────────────┬─────────────────────────────┤
//! │     AsyncUdpTransport       │    SecuredPacketSocket       │
//! │     (tokio UdpSocket)       │  (SecureStream, one peer)    │
//! │                             ├─────────────────────────────┤
//! │                             │     DtlsStream (webrtc-dtls) │
//! └─────────────────────────────┴─────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtls;
pub mod guard;
pub mod plain;
pub mod secured;
pub mod transport;
pub mod udp_async;

pub use dtls::{DtlsDialer, DtlsStream, SecureDialer};
pub use guard::IoGuard;
pub use plain::{PlainUdpDialer, UdpStream};
pub use secured::{SecureStream, SecuredPacketSocket};
pub use transport::{
    AtomicTransportStats, Transport, TransportError, TransportResult, TransportStats,
};
pub use udp_async::AsyncUdpTransport;

use std::time::Duration;

/// Default bound on the secure handshake with the relay server
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Receive buffer size requested from the kernel
    pub recv_buffer_size: usize,
    /// Send buffer size requested from the kernel
    pub send_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 256 * 1024,
            send_buffer_size: 256 * 1024,
        }
    }
}
