//! Peer address coordinator.

use super::error::CoordinatorError;
use super::record::PeerAddressRecord;
use super::slot::AddressSlot;
use async_trait::async_trait;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Default slot polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Key written by the echo side
pub const RESPONDER_KEY: &str = "relay.port";

/// Key written by the ping side
pub const INITIATOR_KEY: &str = "relayc.port";

/// Which pair of slot keys a process uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Echo side: writes [`RESPONDER_KEY`], reads [`INITIATOR_KEY`]
    Responder,
    /// Ping side: writes [`INITIATOR_KEY`], reads [`RESPONDER_KEY`]
    Initiator,
}

impl SlotRole {
    /// Key this role publishes its own relay address under
    #[must_use]
    pub fn publish_key(self) -> &'static str {
        match self {
            SlotRole::Responder => RESPONDER_KEY,
            SlotRole::Initiator => INITIATOR_KEY,
        }
    }

    /// Key this role polls for the peer's relay address
    #[must_use]
    pub fn peer_key(self) -> &'static str {
        self.counterpart().publish_key()
    }

    /// The other role
    #[must_use]
    pub fn counterpart(self) -> Self {
        match self {
            SlotRole::Responder => SlotRole::Initiator,
            SlotRole::Initiator => SlotRole::Responder,
        }
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRole::Responder => f.write_str("responder"),
            SlotRole::Initiator => f.write_str("initiator"),
        }
    }
}

impl FromStr for SlotRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "responder" | "echo" => Ok(SlotRole::Responder),
            "initiator" | "ping" => Ok(SlotRole::Initiator),
            other => Err(format!(
                "unknown role '{other}', expected responder or initiator"
            )),
        }
    }
}

/// Notified each time the peer's relay address changes
#[async_trait]
pub trait PeerObserver: Send + Sync {
    /// `peer` is the newly observed, resolved relay address
    async fn peer_changed(&self, peer: SocketAddr);
}

/// Publishes this process's relay address and follows the peer's.
///
/// The last value seen in the peer slot is private to [`run`](Self::run).
/// Resolved peer addresses are broadcast on a watch channel so the
/// diagnostic loop always targets the latest one.
pub struct Coordinator {
    slot: Arc<dyn AddressSlot>,
    publish_key: String,
    peer_key: String,
    poll_interval: Duration,
    peer_tx: watch::Sender<Option<SocketAddr>>,
}

impl Coordinator {
    /// Coordinator using the keys of `role`
    #[must_use]
    pub fn new(slot: Arc<dyn AddressSlot>, role: SlotRole) -> Self {
        Self::with_keys(slot, role.publish_key(), role.peer_key())
    }

    /// Coordinator using explicit keys
    pub fn with_keys(
        slot: Arc<dyn AddressSlot>,
        publish_key: impl Into<String>,
        peer_key: impl Into<String>,
    ) -> Self {
        let (peer_tx, _) = watch::channel(None);
        Self {
            slot,
            publish_key: publish_key.into(),
            peer_key: peer_key.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            peer_tx,
        }
    }

    /// Override the polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Polling interval
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Key the own address is written under
    #[must_use]
    pub fn publish_key(&self) -> &str {
        &self.publish_key
    }

    /// Key the peer address is read from
    #[must_use]
    pub fn peer_key(&self) -> &str {
        &self.peer_key
    }

    /// Receiver for the latest resolved peer address
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.peer_tx.subscribe()
    }

    /// Latest resolved peer address, if any
    #[must_use]
    pub fn current_peer(&self) -> Option<SocketAddr> {
        *self.peer_tx.borrow()
    }

    /// Write `addr` to this process's slot
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Unavailable`] if the slot cannot be written.
    pub async fn publish(&self, addr: SocketAddr) -> Result<(), CoordinatorError> {
        let record = PeerAddressRecord::from(addr);
        self.slot
            .write(&self.publish_key, &record.to_string())
            .await?;
        tracing::info!("Published relay address {} to '{}'", record, self.publish_key);
        Ok(())
    }

    /// Read the peer slot once.
    ///
    /// Returns the value if it differs from `last_seen`. An absent value reads
    /// as empty, so nothing is reported until the peer has written.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Unavailable`] if the slot cannot be read.
    pub async fn poll_once(&self, last_seen: &str) -> Result<Option<String>, CoordinatorError> {
        let value = self.slot.read(&self.peer_key).await?.unwrap_or_default();
        Ok((value != last_seen).then_some(value))
    }

    /// Publish `own` and follow the peer slot forever.
    ///
    /// Publishing is retried every tick until it succeeds. Slot failures are
    /// transient and retried on the next tick. For every changed value the
    /// observer runs first, then the address is broadcast to subscribers. A
    /// value that does not parse is remembered so it is reported only once;
    /// a hostname that fails to resolve is looked up again next tick.
    /// Never returns; drop the future to stop.
    pub async fn run(&self, own: SocketAddr, observer: &dyn PeerObserver) -> Infallible {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut published = false;
        let mut last_seen = String::new();

        loop {
            ticker.tick().await;

            if !published {
                match self.publish(own).await {
                    Ok(()) => published = true,
                    Err(e) => tracing::debug!("Publish deferred: {}", e),
                }
            }

            let value = match self.poll_once(&last_seen).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::trace!("Peer slot not available yet: {}", e);
                    continue;
                }
            };
            let examined = examine(&value).await;
            if settles(&examined) {
                last_seen.clone_from(&value);
            }
            match examined {
                Ok(None) => tracing::info!("Peer address withdrawn from '{}'", self.peer_key),
                Ok(Some(peer)) => {
                    tracing::info!("Peer relay address {} from '{}'", peer, self.peer_key);
                    observer.peer_changed(peer).await;
                    self.peer_tx.send_replace(Some(peer));
                }
                Err(e) if e.is_transient() => tracing::debug!("Retrying peer slot value: {}", e),
                Err(e) => tracing::warn!("Ignoring peer slot value: {}", e),
            }
        }
    }
}

/// Turn a changed slot value into a peer address. `Ok(None)` is a withdrawal.
async fn examine(value: &str) -> Result<Option<SocketAddr>, CoordinatorError> {
    if value.is_empty() {
        return Ok(None);
    }
    PeerAddressRecord::parse(value)?.resolve().await.map(Some)
}

/// Whether a value is done with, or must be examined again next tick
fn settles(examined: &Result<Option<SocketAddr>, CoordinatorError>) -> bool {
    !matches!(examined, Err(e) if e.is_transient())
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("publish_key", &self.publish_key)
            .field("peer_key", &self.peer_key)
            .field("poll_interval", &self.poll_interval)
            .field("peer", &self.current_peer())
            .finish_non_exhaustive()
    }
}
