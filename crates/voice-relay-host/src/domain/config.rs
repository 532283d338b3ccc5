//! Runtime configuration for the host process.
//!
//! These are the resolved, strongly-typed settings the components run with.
//! The on-disk TOML schema lives in `infrastructure::storage::config` and is
//! converted into a [`HostConfig`] after CLI and environment overrides are
//! applied in `main.rs`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use voice_relay_core::protocol::messages::{
    DEFAULT_DISCOVERY_PORT, DEFAULT_RELAY_PORT, DEFAULT_WEB_PORT,
};

/// Address prefix of the Windows mobile-hotspot subnet.
pub const DEFAULT_SUBNET_PREFIX: &str = "192.168.137.";

/// Host address announced when no interface matches the subnet prefix.
pub const DEFAULT_FALLBACK_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 137, 1);

/// Settings for the WebSocket relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Socket address the relay listener binds to.
    pub bind_addr: SocketAddr,
    /// Keepalive behaviour for each session.
    pub keepalive: KeepaliveConfig,
}

/// WebSocket-level keepalive for one session.
///
/// The session sends a ping every `interval` and closes when nothing at all
/// has arrived from the client for `interval + timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Ping period.  Zero disables keepalive entirely.
    pub interval: Duration,
    /// Grace period on top of `interval` before an idle client is dropped.
    pub timeout: Duration,
}

impl KeepaliveConfig {
    /// Keepalive switched off.
    pub const DISABLED: Self = Self {
        interval: Duration::ZERO,
        timeout: Duration::ZERO,
    };

    /// Returns `true` when pings are sent.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Longest tolerated silence from the client.
    pub fn idle_limit(&self) -> Duration {
        self.interval + self.timeout
    }
}

/// Settings for the UDP discovery beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Destination of each announcement datagram.
    pub target: SocketAddr,
    /// Period between announcements.
    pub interval: Duration,
    /// Interface addresses starting with this prefix are preferred.
    pub subnet_prefix: String,
    /// Announced when no interface matches `subnet_prefix`.
    pub fallback_address: IpAddr,
    /// Fixed address to announce, bypassing interface detection.
    pub announce_address: Option<IpAddr>,
}

/// Settings for the HTTP server that hosts the browser client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebUiConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    /// Directory of static files; `None` serves only the status route.
    pub root: Option<PathBuf>,
}

/// Where delivered text goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// One line per delivery on standard output.
    #[default]
    Stdout,
    /// Deliveries are only logged.
    Log,
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "log" => Ok(Self::Log),
            other => Err(format!("unknown sink '{other}' (expected 'stdout' or 'log')")),
        }
    }
}

impl SinkKind {
    /// Name used in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Log => "log",
        }
    }
}

/// Complete resolved configuration of one host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub relay: RelayConfig,
    pub discovery: DiscoveryConfig,
    pub web: WebUiConfig,
    /// Name sent in the welcome and in announcements.
    pub host_name: String,
    /// Initial value of the sync flag.
    pub sync_enabled_on_start: bool,
    pub sink: SinkKind,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_RELAY_PORT)),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(20),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: SocketAddr::from(([255, 255, 255, 255], DEFAULT_DISCOVERY_PORT)),
            interval: Duration::from_millis(2000),
            subnet_prefix: DEFAULT_SUBNET_PREFIX.to_string(),
            fallback_address: IpAddr::V4(DEFAULT_FALLBACK_ADDRESS),
            announce_address: None,
        }
    }
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_WEB_PORT)),
            root: None,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            discovery: DiscoveryConfig::default(),
            web: WebUiConfig::default(),
            host_name: "voice-relay".to_string(),
            sync_enabled_on_start: true,
            sink: SinkKind::default(),
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let cfg = HostConfig::default();
        assert_eq!(cfg.relay.bind_addr.port(), 9527);
        assert_eq!(cfg.web.bind_addr.port(), 9528);
        assert_eq!(cfg.discovery.target.port(), 9530);
    }

    #[test]
    fn test_default_discovery_targets_limited_broadcast() {
        let cfg = DiscoveryConfig::default();
        assert_eq!(cfg.target.ip(), IpAddr::V4(Ipv4Addr::BROADCAST));
        assert_eq!(cfg.interval, Duration::from_secs(2));
        assert_eq!(cfg.fallback_address.to_string(), "192.168.137.1");
    }

    #[test]
    fn test_keepalive_idle_limit_is_interval_plus_timeout() {
        let ka = KeepaliveConfig::default();
        assert!(ka.is_enabled());
        assert_eq!(ka.idle_limit(), Duration::from_secs(40));
    }

    #[test]
    fn test_zero_interval_disables_keepalive() {
        assert!(!KeepaliveConfig::DISABLED.is_enabled());
    }

    #[test]
    fn test_sink_kind_parses_case_insensitively() {
        assert_eq!("STDOUT".parse::<SinkKind>(), Ok(SinkKind::Stdout));
        assert_eq!(" log ".parse::<SinkKind>(), Ok(SinkKind::Log));
        assert!("printer".parse::<SinkKind>().is_err());
    }
}
