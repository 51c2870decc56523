//! Echo responder.

use std::sync::Arc;
use turnprobe_transport::{Transport, TransportError};

/// Default receive buffer size
pub const DEFAULT_ECHO_BUFFER: usize = 1600;

/// Counters of a finished echo loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoStats {
    /// Packets reflected
    pub packets: u64,
    /// Bytes reflected
    pub bytes: u64,
}

/// Reflects every received packet back to its sender
pub struct EchoResponder {
    transport: Arc<dyn Transport>,
    buffer_size: usize,
}

impl EchoResponder {
    /// Echo on `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            buffer_size: DEFAULT_ECHO_BUFFER,
        }
    }

    /// Override the receive buffer size
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Run until the first read or write error.
    ///
    /// A socket closed by its owner ends the loop normally.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error other than [`TransportError::Closed`].
    pub async fn run(&self) -> Result<EchoStats, TransportError> {
        let mut buf = vec![0u8; self.buffer_size];
        let mut stats = EchoStats::default();

        let result = loop {
            let (n, from) = match self.transport.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => break e,
            };
            if let Err(e) = self.transport.send_to(&buf[..n], from).await {
                break e;
            }
            stats.packets += 1;
            stats.bytes += n as u64;
            tracing::debug!("Echoed {} bytes to {}", n, from);
        };

        if result.is_closed() {
            tracing::info!(
                "Echo loop stopped: {} packets, {} bytes",
                stats.packets,
                stats.bytes
            );
            Ok(stats)
        } else {
            tracing::error!("Echo loop failed after {} packets: {}", stats.packets, result);
            Err(result)
        }
    }
}
