//! Ping originator.
//!
//! Probes are sent fire-and-forget at a fixed interval while a listener
//! measures every echoed probe. Replies are not matched to probes; each valid
//! reply gets the next sequence number.

use crate::probe::ProbeMessage;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use turnprobe_transport::{Transport, TransportError};

/// Ping run parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    /// Number of probes to send
    pub count: u32,
    /// Delay between probes
    pub interval: Duration,
    /// How long to wait for stragglers after the last probe
    pub linger: Duration,
    /// Receive buffer size
    pub buffer_size: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 10,
            interval: Duration::from_secs(1),
            linger: Duration::from_secs(2),
            buffer_size: 1600,
        }
    }
}

/// One measured reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReply {
    /// Valid replies received so far, starting at 1
    pub seq: u64,
    /// Payload size
    pub bytes: usize,
    /// Reported sender
    pub from: SocketAddr,
    /// Round-trip time
    pub rtt: Duration,
}

impl fmt::Display for PingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes from {}: seq={} time={:.3} ms",
            self.bytes,
            self.from,
            self.seq,
            self.rtt.as_secs_f64() * 1000.0
        )
    }
}

/// Totals of a ping run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingSummary {
    /// Probes sent
    pub sent: u32,
    /// Valid replies received
    pub received: u32,
    /// Fastest reply
    pub min: Option<Duration>,
    /// Mean round-trip time
    pub avg: Option<Duration>,
    /// Slowest reply
    pub max: Option<Duration>,
}

impl PingSummary {
    /// Summarize `sent` probes and the measured round-trip times
    #[must_use]
    pub fn from_rtts(sent: u32, rtts: &[Duration]) -> Self {
        let received = u32::try_from(rtts.len()).unwrap_or(u32::MAX);
        let avg = (!rtts.is_empty()).then(|| rtts.iter().sum::<Duration>() / received);
        Self {
            sent,
            received,
            min: rtts.iter().min().copied(),
            avg,
            max: rtts.iter().max().copied(),
        }
    }

    /// Percentage of probes without a reply
    #[must_use]
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        f64::from(self.sent.saturating_sub(self.received)) * 100.0 / f64::from(self.sent)
    }
}

impl fmt::Display for PingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} probes transmitted, {} received, {:.1}% loss",
            self.sent,
            self.received,
            self.loss_percent()
        )?;
        if let (Some(min), Some(avg), Some(max)) = (self.min, self.avg, self.max) {
            write!(
                f,
                ", rtt min/avg/max = {:.3}/{:.3}/{:.3} ms",
                min.as_secs_f64() * 1000.0,
                avg.as_secs_f64() * 1000.0,
                max.as_secs_f64() * 1000.0
            )?;
        }
        Ok(())
    }
}

/// Sends timestamped probes and measures their echoes
pub struct Pinger {
    transport: Arc<dyn Transport>,
    config: PingConfig,
}

impl Pinger {
    /// Ping over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: PingConfig) -> Self {
        Self { transport, config }
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &PingConfig {
        &self.config
    }

    /// Ping a fixed target
    ///
    /// # Errors
    ///
    /// Returns the first read or write error.
    pub async fn run_to(
        &self,
        target: SocketAddr,
        on_reply: impl FnMut(&PingReply) + Send,
    ) -> Result<PingSummary, TransportError> {
        let (_tx, rx) = watch::channel(Some(target));
        self.run(rx, on_reply).await
    }

    /// Ping whatever address `target` holds at each send.
    ///
    /// Ends once `count` replies arrived, or `linger` after the last probe.
    /// Probes due while no target is known are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error.
    pub async fn run(
        &self,
        target: watch::Receiver<Option<SocketAddr>>,
        mut on_reply: impl FnMut(&PingReply) + Send,
    ) -> Result<PingSummary, TransportError> {
        let mut rtts = Vec::with_capacity(self.config.count as usize);
        let mut sent = 0u32;

        {
            let listener = self.listen(&mut rtts, &mut on_reply);
            let sender = self.send_probes(&target, &mut sent);
            tokio::pin!(listener);
            tokio::pin!(sender);

            let all_replied = tokio::select! {
                result = &mut sender => {
                    result?;
                    false
                }
                result = &mut listener => {
                    result?;
                    true
                }
            };

            if !all_replied {
                match tokio::time::timeout(self.config.linger, &mut listener).await {
                    Ok(result) => result?,
                    Err(_) => tracing::debug!("No more replies after {:?}", self.config.linger),
                }
            }
        }

        let summary = PingSummary::from_rtts(sent, &rtts);
        tracing::info!("{}", summary);
        Ok(summary)
    }

    async fn send_probes(
        &self,
        target: &watch::Receiver<Option<SocketAddr>>,
        sent: &mut u32,
    ) -> Result<(), TransportError> {
        for i in 0..self.config.count {
            if i > 0 {
                tokio::time::sleep(self.config.interval).await;
            }
            let Some(peer) = *target.borrow() else {
                tracing::warn!("No peer address yet, skipping probe {}", i + 1);
                continue;
            };

            let probe = ProbeMessage::now().encode();
            self.transport.send_to(probe.as_bytes(), peer).await?;
            *sent += 1;
            tracing::trace!("Probe {} to {}: {}", i + 1, peer, probe);
        }
        Ok(())
    }

    async fn listen(
        &self,
        rtts: &mut Vec<Duration>,
        on_reply: &mut (impl FnMut(&PingReply) + Send),
    ) -> Result<(), TransportError> {
        let mut buf = vec![0u8; self.config.buffer_size];
        let mut seq = 0u64;

        while rtts.len() < self.config.count as usize {
            let (n, from) = self.transport.recv_from(&mut buf).await?;
            let Some(probe) = ProbeMessage::parse(&buf[..n]) else {
                tracing::trace!("Ignoring {} byte non-probe packet from {}", n, from);
                continue;
            };

            seq += 1;
            let reply = PingReply {
                seq,
                bytes: n,
                from,
                rtt: probe.rtt(),
            };
            tracing::info!("{}", reply);
            rtts.push(reply.rtt);
            on_reply(&reply);
        }
        Ok(())
    }
}
