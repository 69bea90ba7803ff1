//! Transport layer for PBus.
//!
//! A [`Connection`] owns one UDP socket toward one device and correlates
//! replies to in-flight requests by tag; [`discover`] is the fire-and-collect
//! broadcast variant used to find devices without knowing their address.

mod connection;
mod discovery;

pub use connection::Connection;
pub use discovery::{discover, DiscoveryConfig};

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_PORT, DEFAULT_TIMEOUT};

/// Connection configuration supplied by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Device address.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Device UDP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default per-request timeout, overridable per call.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl ConnectionConfig {
    /// Configuration for a device at `host` with default port and timeout.
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            port: default_port(),
            timeout: default_timeout(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(default_host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_config_builders() {
        let config = ConnectionConfig::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)))
            .with_port(9002)
            .with_timeout(Duration::from_millis(500));
        assert_eq!(config.port, 9002);
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ConnectionConfig = toml::from_str("host = \"192.168.1.40\"").unwrap();
        assert_eq!(config.host.to_string(), "192.168.1.40");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
