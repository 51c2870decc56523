//! Textual relay address records.

use super::error::CoordinatorError;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A relay endpoint as published to a slot: `host:port`.
///
/// IPv6 hosts use the bracket form (`[::1]:3478`). Hostnames are allowed and
/// resolved on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddressRecord {
    host: String,
    port: u16,
}

impl PeerAddressRecord {
    /// Build a record from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, surrounding whitespace ignored
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::InvalidAddress`] if the host or port is
    /// missing or the port is not a number.
    pub fn parse(value: &str) -> Result<Self, CoordinatorError> {
        let trimmed = value.trim();
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| CoordinatorError::invalid_address(value, "expected host:port"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(CoordinatorError::invalid_address(value, "empty host"));
        }
        if host.contains(':') && !trimmed.starts_with('[') {
            return Err(CoordinatorError::invalid_address(
                value,
                "IPv6 hosts must be bracketed",
            ));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| CoordinatorError::invalid_address(value, format!("port: {e}")))?;

        Ok(Self::new(host, port))
    }

    /// Host part, without brackets
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to a socket address, taking the first result.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Unresolved`] if the host does not
    /// resolve.
    pub async fn resolve(&self) -> Result<SocketAddr, CoordinatorError> {
        if let Ok(ip) = self.host.parse() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| CoordinatorError::unresolved(&self.to_string(), e))?
            .next()
            .ok_or_else(|| CoordinatorError::unresolved(&self.to_string(), "no addresses"))
    }
}

impl fmt::Display for PeerAddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for PeerAddressRecord {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<SocketAddr> for PeerAddressRecord {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let record = PeerAddressRecord::parse("192.0.2.7:50123").unwrap();
        assert_eq!(record.host(), "192.0.2.7");
        assert_eq!(record.port(), 50123);
        assert_eq!(record.to_string(), "192.0.2.7:50123");
    }

    #[test]
    fn test_parse_ipv6_brackets() {
        let record: PeerAddressRecord = "[2001:db8::1]:3478".parse().unwrap();
        assert_eq!(record.host(), "2001:db8::1");
        assert_eq!(record.to_string(), "[2001:db8::1]:3478");

        assert!(PeerAddressRecord::parse("2001:db8::1:3478").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PeerAddressRecord::parse("").is_err());
        assert!(PeerAddressRecord::parse("no-port").is_err());
        assert!(PeerAddressRecord::parse(":3478").is_err());
        assert!(PeerAddressRecord::parse("host:99999").is_err());
        assert!(PeerAddressRecord::parse("host:abc").is_err());
    }

    #[test]
    fn test_from_socket_addr() {
        let addr: SocketAddr = "[::1]:9000".parse().unwrap();
        let record = PeerAddressRecord::from(addr);
        assert_eq!(record.to_string(), "[::1]:9000");
        assert_eq!(PeerAddressRecord::parse(&record.to_string()).unwrap(), record);
    }

    #[tokio::test]
    async fn test_resolve_literal_and_hostname() {
        let addr = PeerAddressRecord::parse(" 127.0.0.1:4000\n")
            .unwrap()
            .resolve()
            .await
            .unwrap();
        assert_eq!(addr, "127.0.0.1:4000".parse().unwrap());

        let addr = PeerAddressRecord::new("localhost", 4001)
            .resolve()
            .await
            .unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 4001);
    }

    #[tokio::test]
    async fn test_resolve_failure_is_transient() {
        let err = PeerAddressRecord::new("peer.invalid", 4000)
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Unresolved { .. }));
        assert!(err.is_transient());
    }
}
