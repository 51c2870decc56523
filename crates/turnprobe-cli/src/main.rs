//! turnprobe CLI
//!
//! Relay round-trip diagnostics over DTLS-secured TURN allocations.

mod config;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use config::Config;
use turnprobe_core::{ProbeClient, ProbeConfig, ProbeOutcome};
use turnprobe_discovery::{FileSlot, TurnConnector};
use turnprobe_transport::{DtlsDialer, PlainUdpDialer, SecureDialer};

/// turnprobe - measure round trips through a TURN relay
#[derive(Parser)]
#[command(name = "turnprobe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay server host
    #[arg(long)]
    host: Option<String>,

    /// Relay server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Relay credentials as user=pass
    #[arg(short, long)]
    user: Option<String>,

    /// Authentication realm
    #[arg(long)]
    realm: Option<String>,

    /// Run the pinger instead of the echo responder
    #[arg(long)]
    ping: bool,

    /// Slot role (responder or initiator); follows --ping when omitted
    #[arg(long)]
    role: Option<String>,

    /// Directory holding the shared address slots
    #[arg(long)]
    slot_dir: Option<PathBuf>,

    /// Probes to send in ping mode
    #[arg(long)]
    count: Option<u32>,

    /// Delay between probes in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Reach the relay server over plain UDP instead of DTLS
    #[arg(long)]
    insecure_udp: bool,
}

impl Cli {
    /// Flags override file values
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.relay.host = host;
        }
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(user) = self.user {
            config.relay.user = Some(user);
        }
        if let Some(realm) = self.realm {
            config.relay.realm = realm;
        }
        if self.ping {
            config.probe.ping = true;
        }
        if let Some(role) = self.role {
            config.probe.role = Some(role);
        }
        if let Some(dir) = self.slot_dir {
            config.rendezvous.slot_dir = dir;
        }
        if let Some(count) = self.count {
            config.probe.count = count;
        }
        if let Some(interval) = self.interval_ms {
            config.probe.interval_ms = interval;
        }
        if self.insecure_udp {
            config.relay.secure = false;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let (mut config, unsaved) = match &cli.config {
        Some(path) => (
            Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None,
        ),
        None => Config::load_or_default()?,
    };
    cli.apply(&mut config);

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if let Some(e) = unsaved {
        tracing::debug!("Default config not saved: {:#}", e);
    }

    // Validate configuration
    config.validate()?;

    let outcome = run(&config).await?;
    match outcome {
        ProbeOutcome::Pinged(summary) => {
            println!("{summary}");
        }
        ProbeOutcome::Echoed(stats) => {
            println!("Echoed {} packets ({} bytes)", stats.packets, stats.bytes);
        }
        ProbeOutcome::Interrupted => {
            println!("Interrupted");
        }
        ProbeOutcome::LoopFailed(e) => {
            anyhow::bail!("Diagnostic loop failed: {}", e);
        }
    }

    Ok(())
}

/// Run one probe with the merged configuration
async fn run(config: &Config) -> anyhow::Result<ProbeOutcome> {
    let server = resolve_server(&config.relay.host, config.relay.port).await?;

    let mut probe = ProbeConfig::echo(server, config.credentials()?);
    probe.mode = config.mode();
    probe.role = config.role()?;
    probe.poll_interval = Duration::from_millis(config.rendezvous.poll_interval_ms);
    probe.peer_timeout = Duration::from_secs(config.rendezvous.peer_timeout_secs);

    let dialer: Arc<dyn SecureDialer> = if config.relay.secure {
        let timeout = Duration::from_secs(config.relay.handshake_timeout_secs);
        Arc::new(DtlsDialer::new(timeout)?)
    } else {
        tracing::warn!("Relay link is not encrypted (--insecure-udp)");
        Arc::new(PlainUdpDialer::new())
    };
    let slot = Arc::new(FileSlot::new(&config.rendezvous.slot_dir));

    tracing::info!(
        "Probing via {} as {} ({})",
        server,
        probe.role,
        if config.probe.ping { "ping" } else { "echo" }
    );

    let client = ProbeClient::new(probe, dialer, Arc::new(TurnConnector::default()), slot);
    let outcome = client
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(outcome)
}

/// Resolve the relay server to its first address
async fn resolve_server(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve {host}:{port}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("{host}:{port} resolved to no addresses"))
}
