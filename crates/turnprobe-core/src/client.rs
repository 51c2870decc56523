//! One probe run from relay setup to teardown.

use crate::echo::{EchoResponder, EchoStats};
use crate::error::{Error, Result};
use crate::ping::{PingConfig, PingSummary, Pinger};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use turnprobe_discovery::relay::{RelayPrimer, RelaySession};
use turnprobe_discovery::rendezvous::DEFAULT_POLL_INTERVAL;
use turnprobe_discovery::{AddressSlot, Coordinator, RelayConnector, RelayCredentials, SlotRole};
use turnprobe_transport::{SecureDialer, Transport, TransportError};

/// Default wait for the peer's first relay address
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(30);

/// Which diagnostic loop to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMode {
    /// Reflect every packet
    Echo,
    /// Send probes to the peer and measure replies
    Ping(PingConfig),
}

/// Parameters of a probe run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Relay server address
    pub server: SocketAddr,
    /// Relay credentials
    pub credentials: RelayCredentials,
    /// Diagnostic loop
    pub mode: ProbeMode,
    /// Slot keys to publish to and poll
    pub role: SlotRole,
    /// Peer slot polling interval
    pub poll_interval: Duration,
    /// Wait for the first peer address in ping mode
    pub peer_timeout: Duration,
}

impl ProbeConfig {
    /// Echo run with default timings
    #[must_use]
    pub fn echo(server: SocketAddr, credentials: RelayCredentials) -> Self {
        Self {
            server,
            credentials,
            mode: ProbeMode::Echo,
            role: SlotRole::Responder,
            poll_interval: DEFAULT_POLL_INTERVAL,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }

    /// Ping run with default timings
    #[must_use]
    pub fn ping(server: SocketAddr, credentials: RelayCredentials, ping: PingConfig) -> Self {
        Self {
            mode: ProbeMode::Ping(ping),
            role: SlotRole::Initiator,
            ..Self::echo(server, credentials)
        }
    }

    /// Check timings
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero intervals or probe counts.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll interval must be > 0".to_string()));
        }
        if let ProbeMode::Ping(ping) = &self.mode {
            if ping.count == 0 {
                return Err(Error::InvalidConfig("ping count must be > 0".to_string()));
            }
            if ping.buffer_size == 0 {
                return Err(Error::InvalidConfig("ping buffer size must be > 0".to_string()));
            }
        }
        Ok(())
    }
}

/// How a run ended
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Echo loop ended because the socket closed
    Echoed(EchoStats),
    /// Ping run finished
    Pinged(PingSummary),
    /// The diagnostic loop failed; setup had succeeded
    LoopFailed(TransportError),
    /// Shutdown was requested
    Interrupted,
}

impl ProbeOutcome {
    /// Returns true unless the diagnostic loop failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, ProbeOutcome::LoopFailed(_))
    }
}

/// Runs a relay session, the address coordinator and one diagnostic loop.
///
/// The session is owned by the run; loops only borrow shared handles, and the
/// session is closed before [`run_until`](Self::run_until) returns.
pub struct ProbeClient {
    config: ProbeConfig,
    dialer: Arc<dyn SecureDialer>,
    connector: Arc<dyn RelayConnector>,
    slot: Arc<dyn AddressSlot>,
}

impl ProbeClient {
    /// Create a client
    #[must_use]
    pub fn new(
        config: ProbeConfig,
        dialer: Arc<dyn SecureDialer>,
        connector: Arc<dyn RelayConnector>,
        slot: Arc<dyn AddressSlot>,
    ) -> Self {
        Self {
            config,
            dialer,
            connector,
            slot,
        }
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run to completion
    ///
    /// # Errors
    ///
    /// See [`run_until`](Self::run_until).
    pub async fn run(&self) -> Result<ProbeOutcome> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until the loop ends or `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns setup errors (handshake, relay client, allocation) and
    /// [`Error::PeerTimeout`] in ping mode. Loop failures are reported as
    /// [`ProbeOutcome::LoopFailed`].
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<ProbeOutcome> {
        self.config.validate()?;

        let mut session = RelaySession::new(self.config.server, self.config.credentials.clone());
        let relay_addr = session
            .establish(self.dialer.as_ref(), self.connector.as_ref())
            .await?;

        let result = tokio::select! {
            result = self.drive(&session, relay_addr) => result,
            () = shutdown => {
                tracing::info!("Shutdown requested");
                Ok(ProbeOutcome::Interrupted)
            }
        };

        if let Err(e) = session.close().await {
            tracing::warn!("Relay session teardown: {}", e);
        }
        result
    }

    async fn drive(&self, session: &RelaySession, relay_addr: SocketAddr) -> Result<ProbeOutcome> {
        let relay = session
            .relay_transport()
            .ok_or_else(|| Error::InvalidConfig("relay endpoint missing".to_string()))?;

        match session.prime_self().await {
            Ok(mapped) => tracing::debug!("Primed own mapped address {}", mapped),
            Err(e) => tracing::warn!("Self priming failed: {}", e),
        }

        let coordinator = Coordinator::new(Arc::clone(&self.slot), self.config.role)
            .with_poll_interval(self.config.poll_interval);
        let peers = coordinator.subscribe();
        let primer = RelayPrimer::new(Arc::clone(&relay));

        tokio::select! {
            never = coordinator.run(relay_addr, &primer) => match never {},
            outcome = self.diagnose(relay, peers, relay_addr) => {
                if let Ok(ProbeOutcome::LoopFailed(e)) = &outcome {
                    tracing::error!("Diagnostic loop ended: {}", e);
                }
                outcome
            }
        }
    }

    async fn diagnose(
        &self,
        relay: Arc<dyn Transport>,
        peers: watch::Receiver<Option<SocketAddr>>,
        relay_addr: SocketAddr,
    ) -> Result<ProbeOutcome> {
        let ping = match &self.config.mode {
            ProbeMode::Echo => {
                return Ok(EchoResponder::new(relay)
                    .run()
                    .await
                    .map_or_else(ProbeOutcome::LoopFailed, ProbeOutcome::Echoed));
            }
            ProbeMode::Ping(ping) => ping.clone(),
        };

        let mut first = peers.clone();
        let peer = match tokio::time::timeout(
            self.config.peer_timeout,
            first.wait_for(Option::is_some),
        )
        .await
        {
            Ok(Ok(peer)) => *peer,
            _ => None,
        }
        .ok_or(Error::PeerTimeout(self.config.peer_timeout))?;
        tracing::info!("Pinging {} via relay {}", peer, relay_addr);

        Ok(Pinger::new(relay, ping)
            .run(peers, |_| {})
            .await
            .map_or_else(ProbeOutcome::LoopFailed, ProbeOutcome::Pinged))
    }
}
