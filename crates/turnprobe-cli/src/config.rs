//! Configuration system for the turnprobe CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use turnprobe_core::{PingConfig, ProbeMode};
use turnprobe_discovery::relay::{DEFAULT_REALM, DEFAULT_RELAY_PORT};
use turnprobe_discovery::{RelayCredentials, SlotRole};
use turnprobe_transport::DEFAULT_HANDSHAKE_TIMEOUT;

/// turnprobe configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relay server configuration
    #[serde(default)]
    pub relay: RelayConfig,
    /// Address exchange configuration
    #[serde(default)]
    pub rendezvous: RendezvousConfig,
    /// Diagnostic loop configuration
    #[serde(default)]
    pub probe: ProbeSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay server host name or address
    #[serde(default)]
    pub host: String,
    /// Relay server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Credentials as `user=pass`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Authentication realm
    #[serde(default = "default_realm")]
    pub realm: String,
    /// Reach the relay server over DTLS (plain UDP when false)
    #[serde(default = "default_true")]
    pub secure: bool,
    /// DTLS handshake bound in seconds
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

/// Address exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousConfig {
    /// Directory shared by both processes
    #[serde(default = "default_slot_dir")]
    pub slot_dir: PathBuf,
    /// Peer slot polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wait for the peer's first address in seconds
    #[serde(default = "default_peer_timeout_secs")]
    pub peer_timeout_secs: u64,
}

/// Diagnostic loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSection {
    /// Run the pinger instead of the echo responder
    #[serde(default)]
    pub ping: bool,
    /// Slot role override (`responder` or `initiator`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Probes to send
    #[serde(default = "default_count")]
    pub count: u32,
    /// Delay between probes in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Wait for late replies in milliseconds
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,
    /// Receive buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_realm() -> String {
    DEFAULT_REALM.to_string()
}

fn default_true() -> bool {
    true
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_secs()
}

fn default_slot_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_peer_timeout_secs() -> u64 {
    30
}

fn default_count() -> u32 {
    10
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_linger_ms() -> u64 {
    2000
}

fn default_buffer_size() -> usize {
    1600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            user: None,
            realm: default_realm(),
            secure: true,
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            slot_dir: default_slot_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            peer_timeout_secs: default_peer_timeout_secs(),
        }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            ping: false,
            role: None,
            count: default_count(),
            interval_ms: default_interval_ms(),
            linger_ms: default_linger_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("turnprobe/config.toml")
    }

    /// Load config from the default path, or write a default one if missing
    ///
    /// # Errors
    ///
    /// Returns an error if an existing config cannot be read.
    pub fn load_or_default() -> anyhow::Result<(Self, Option<anyhow::Error>)> {
        Self::load_or_default_at(&Self::default_path())
    }

    /// Load config from `path`, or write a default one there if missing.
    ///
    /// A failure to write the default file does not fail the load. It is
    /// handed back so the caller can report it once logging is up.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing config cannot be read.
    pub fn load_or_default_at(path: &Path) -> anyhow::Result<(Self, Option<anyhow::Error>)> {
        if path.exists() {
            return Ok((Self::load(path)?, None));
        }
        let config = Self::default();
        let unsaved = config
            .save(path)
            .map_err(|e| e.context(format!("writing default config to {}", path.display())))
            .err();
        Ok((config, unsaved))
    }

    /// Slot role, from the override or the mode
    ///
    /// # Errors
    ///
    /// Returns an error if the override is not a known role.
    pub fn role(&self) -> anyhow::Result<SlotRole> {
        match &self.probe.role {
            Some(role) => role.parse().map_err(|e: String| anyhow::anyhow!(e)),
            None if self.probe.ping => Ok(SlotRole::Initiator),
            None => Ok(SlotRole::Responder),
        }
    }

    /// Parsed relay credentials
    ///
    /// # Errors
    ///
    /// Returns an error if no `user=pass` pair is configured or it is malformed.
    pub fn credentials(&self) -> anyhow::Result<RelayCredentials> {
        let user = self
            .relay
            .user
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Relay credentials missing (expected user=pass)"))?;
        Ok(RelayCredentials::parse(user, &self.relay.realm)?)
    }

    /// Diagnostic loop selected by the configuration
    #[must_use]
    pub fn mode(&self) -> ProbeMode {
        if self.probe.ping {
            ProbeMode::Ping(PingConfig {
                count: self.probe.count,
                interval: Duration::from_millis(self.probe.interval_ms),
                linger: Duration::from_millis(self.probe.linger_ms),
                buffer_size: self.probe.buffer_size,
            })
        } else {
            ProbeMode::Echo
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_host(&self.relay.host)?;

        if self.relay.port == 0 {
            anyhow::bail!("Relay port must not be 0");
        }

        self.credentials()?;

        if self.relay.realm.is_empty() {
            anyhow::bail!("Realm must not be empty");
        }

        if self.relay.handshake_timeout_secs == 0 {
            anyhow::bail!("Handshake timeout must be at least 1 second");
        }

        self.role()?;

        if self.rendezvous.poll_interval_ms == 0 {
            anyhow::bail!("Poll interval must be at least 1 ms");
        }

        if self.probe.count == 0 {
            anyhow::bail!("Probe count must be at least 1");
        }

        if self.probe.buffer_size == 0 || self.probe.buffer_size > 65_535 {
            anyhow::bail!("Buffer size must be between 1 and 65535 bytes");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    fn validate_host(&self, host: &str) -> anyhow::Result<()> {
        if host.is_empty() {
            anyhow::bail!("Relay host missing");
        }

        if host.contains("..") || host.contains('/') || host.contains('\\') {
            anyhow::bail!("Relay host '{}' contains invalid characters", host);
        }

        Ok(())
    }
}
