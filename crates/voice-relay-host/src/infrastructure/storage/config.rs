//! TOML-based configuration persistence for the host.
//!
//! Reads and writes [`FileConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\VoiceRelay\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/voice-relay/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/VoiceRelay/config.toml`
//!
//! ```toml
//! [relay]
//! bind_address = "0.0.0.0"
//! port = 9527
//! keepalive_interval_secs = 20
//! keepalive_timeout_secs = 20
//!
//! [discovery]
//! enabled = true
//! port = 9530
//! interval_ms = 2000
//!
//! [web]
//! enabled = true
//! port = 9528
//! root = "C:\\Program Files\\VoiceRelay\\web"
//!
//! [host]
//! sync_enabled_on_start = true
//! sink = "stdout"
//! log_level = "info"
//! ```
//!
//! Every field has a `#[serde(default = ...)]`, so a missing file, a missing
//! section and a missing key all mean "use the default".

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use voice_relay_core::protocol::messages::{
    DEFAULT_DISCOVERY_PORT, DEFAULT_RELAY_PORT, DEFAULT_WEB_PORT,
};

use crate::domain::config::{
    DiscoveryConfig, HostConfig, KeepaliveConfig, RelayConfig, SinkKind, WebUiConfig,
    DEFAULT_FALLBACK_ADDRESS, DEFAULT_SUBNET_PREFIX,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is not usable.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub web: WebSection,
    #[serde(default)]
    pub host: HostSection,
}

/// `[relay]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySection {
    /// IP address the relay binds to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Ping period in seconds; 0 disables keepalive.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_timeout_secs: u64,
}

/// `[discovery]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_subnet_prefix")]
    pub subnet_prefix: String,
    #[serde(default = "default_fallback_address")]
    pub fallback_address: String,
    /// Fixed address to announce instead of detecting one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce_address: Option<String>,
}

/// `[web]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Directory holding the browser client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// `[host]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSection {
    /// Overrides the OS host name in welcomes and announcements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub sync_enabled_on_start: bool,
    /// `"stdout"` or `"log"`.
    #[serde(default = "default_sink")]
    pub sink: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_relay_port() -> u16 {
    DEFAULT_RELAY_PORT
}
fn default_keepalive_secs() -> u64 {
    20
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_interval_ms() -> u64 {
    2000
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_subnet_prefix() -> String {
    DEFAULT_SUBNET_PREFIX.to_string()
}
fn default_fallback_address() -> String {
    DEFAULT_FALLBACK_ADDRESS.to_string()
}
fn default_web_port() -> u16 {
    DEFAULT_WEB_PORT
}
fn default_sink() -> String {
    "stdout".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_relay_port(),
            keepalive_interval_secs: default_keepalive_secs(),
            keepalive_timeout_secs: default_keepalive_secs(),
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_discovery_port(),
            interval_ms: default_interval_ms(),
            broadcast_address: default_broadcast_address(),
            subnet_prefix: default_subnet_prefix(),
            fallback_address: default_fallback_address(),
            announce_address: None,
        }
    }
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_web_port(),
            root: None,
        }
    }
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            name: None,
            sync_enabled_on_start: default_true(),
            sink: default_sink(),
            log_level: default_log_level(),
        }
    }
}

// ── Conversion to runtime config ──────────────────────────────────────────────

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("'{value}': {e}"),
    })
}

impl FileConfig {
    /// Resolves the file settings into a runtime [`HostConfig`].
    ///
    /// `default_host_name` is used when `host.name` is unset.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for unparsable addresses or an unknown sink.
    pub fn to_host_config(&self, default_host_name: &str) -> Result<HostConfig, ConfigError> {
        let relay_ip = parse_ip("relay.bind_address", &self.relay.bind_address)?;
        let broadcast_ip = parse_ip("discovery.broadcast_address", &self.discovery.broadcast_address)?;
        let fallback_ip = parse_ip("discovery.fallback_address", &self.discovery.fallback_address)?;
        let announce_ip = self
            .discovery
            .announce_address
            .as_deref()
            .map(|a| parse_ip("discovery.announce_address", a))
            .transpose()?;
        let sink: SinkKind = self
            .host
            .sink
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                field: "host.sink",
                reason,
            })?;

        Ok(HostConfig {
            relay: RelayConfig {
                bind_addr: SocketAddr::new(relay_ip, self.relay.port),
                keepalive: KeepaliveConfig {
                    interval: Duration::from_secs(self.relay.keepalive_interval_secs),
                    timeout: Duration::from_secs(self.relay.keepalive_timeout_secs),
                },
            },
            discovery: DiscoveryConfig {
                enabled: self.discovery.enabled,
                target: SocketAddr::new(broadcast_ip, self.discovery.port),
                interval: Duration::from_millis(self.discovery.interval_ms),
                subnet_prefix: self.discovery.subnet_prefix.clone(),
                fallback_address: fallback_ip,
                announce_address: announce_ip,
            },
            web: WebUiConfig {
                enabled: self.web.enabled,
                // The web UI shares the relay's bind address.
                bind_addr: SocketAddr::new(relay_ip, self.web.port),
                root: self.web.root.clone(),
            },
            host_name: self
                .host
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| default_host_name.to_string()),
            sync_enabled_on_start: self.host.sync_enabled_on_start,
            sink,
            log_level: self.host.log_level.clone(),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`FileConfig`] from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<FileConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &FileConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `VoiceRelay` leaf.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("VoiceRelay"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("voice-relay"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("VoiceRelay")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("voice-relay-cfg-{}", uuid::Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: FileConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let text = "[relay]\nport = 10000\n\n[host]\nsink = \"log\"\n";

        // Act
        let cfg: FileConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.relay.port, 10000);
        assert_eq!(cfg.relay.keepalive_interval_secs, 20);
        assert_eq!(cfg.host.sink, "log");
        assert_eq!(cfg.discovery.port, 9530);
        assert!(cfg.web.enabled);
    }

    #[test]
    fn test_defaults_convert_to_default_host_config() {
        let host = FileConfig::default().to_host_config("voice-relay").unwrap();
        assert_eq!(host, HostConfig::default());
    }

    #[test]
    fn test_host_name_override_wins_over_os_name() {
        let mut cfg = FileConfig::default();
        cfg.host.name = Some("Studio PC".to_string());

        let host = cfg.to_host_config("DESKTOP-01").unwrap();

        assert_eq!(host.host_name, "Studio PC");
    }

    #[test]
    fn test_blank_host_name_falls_back_to_os_name() {
        let mut cfg = FileConfig::default();
        cfg.host.name = Some("  ".to_string());
        assert_eq!(cfg.to_host_config("DESKTOP-01").unwrap().host_name, "DESKTOP-01");
    }

    #[test]
    fn test_invalid_bind_address_is_reported_by_field() {
        let mut cfg = FileConfig::default();
        cfg.relay.bind_address = "not.an.ip".to_string();

        let err = cfg.to_host_config("h").unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "relay.bind_address",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_sink_is_rejected() {
        let mut cfg = FileConfig::default();
        cfg.host.sink = "printer".to_string();
        assert!(matches!(
            cfg.to_host_config("h"),
            Err(ConfigError::Invalid { field: "host.sink", .. })
        ));
    }

    #[test]
    fn test_announce_address_is_parsed() {
        let mut cfg = FileConfig::default();
        cfg.discovery.announce_address = Some("10.0.0.7".to_string());

        let host = cfg.to_host_config("h").unwrap();

        assert_eq!(host.discovery.announce_address, Some("10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let cfg = load_config_from(&temp_path()).unwrap();
        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_changes() {
        // Arrange
        let path = temp_path();
        let mut cfg = FileConfig::default();
        cfg.relay.port = 12345;
        cfg.web.root = Some(PathBuf::from("/srv/voice"));
        cfg.host.sync_enabled_on_start = false;

        // Act
        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[relay\nport = ").unwrap();

        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
