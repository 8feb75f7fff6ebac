//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - `/etc/chatbridge/chatbridge.toml`
//! - `~/.config/chatbridge/chatbridge.toml`
//! - `chatbridge.toml` in the working directory
//! - Environment variables (`CHATBRIDGE_*`, nested keys joined with `__`)

use anyhow::{Context, Result};
use chatbridge_backend::{MemoryBackend, MemoryBackendConfig};
use chatbridge_core::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Files probed for configuration, lowest precedence first.
const CONFIG_PATHS: [&str; 3] = [
    "/etc/chatbridge/chatbridge.toml",
    "~/.config/chatbridge/chatbridge.toml",
    "chatbridge.toml",
];

/// Environment variable prefix.
const ENV_PREFIX: &str = "CHATBRIDGE";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Bridge limits.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// In-memory backend setup.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval advertised to hosts, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u32,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Identity sessions authenticate as.
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Access tokens the backend accepts.
    #[serde(default)]
    pub accepted_tokens: Vec<String>,

    /// Channels present before any host connects.
    #[serde(default)]
    pub channels: Vec<SeedChannel>,
}

/// A channel created at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedChannel {
    /// Channel sid.
    pub sid: String,

    /// Display name.
    #[serde(default)]
    pub friendly_name: Option<String>,

    /// Member identities.
    #[serde(default)]
    pub members: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_heartbeat_interval() -> u32 {
    30_000 // 30 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_identity() -> String {
    "chatbridge".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            bridge: BridgeConfig::default(),
            metrics: MetricsConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            accepted_tokens: Vec::new(),
            channels: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default files and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// an environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        for path in CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            builder = builder.add_source(
                config::File::new(expanded.as_ref(), config::FileFormat::Toml).required(false),
            );
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("backend.accepted_tokens"),
            )
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Build the in-memory backend described by the `backend` section.
    #[must_use]
    pub fn build_backend(&self) -> MemoryBackend {
        let backend = MemoryBackend::with_config(MemoryBackendConfig {
            identity: self.backend.identity.clone(),
            accepted_tokens: self.backend.accepted_tokens.clone(),
            ..MemoryBackendConfig::default()
        });

        for seed in &self.backend.channels {
            let members: Vec<&str> = seed.members.iter().map(String::as_str).collect();
            backend.seed_channel(seed.sid.as_str(), seed.friendly_name.as_deref(), &members);
        }

        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.bridge.max_page_size, 300);
        assert!(config.backend.accepted_tokens.is_empty());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [bridge]
            max_page_size = 50

            [backend]
            identity = "alice"
            accepted_tokens = ["secret"]

            [[backend.channels]]
            sid = "CH1"
            friendly_name = "General"
            members = ["alice", "bob"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.bridge.max_page_size, 50);
        assert_eq!(config.bridge.max_last_messages, 100);
        assert_eq!(config.backend.identity, "alice");
        assert_eq!(config.backend.channels.len(), 1);
        assert!(config.backend.channels[0].friendly_name.is_some());
    }

    #[test]
    fn test_build_backend_seeds_channels() {
        let mut config = Config::default();
        config.backend.channels.push(SeedChannel {
            sid: "CH1".into(),
            friendly_name: Some("General".into()),
            members: vec!["alice".into()],
        });

        let backend = config.build_backend();
        assert!(backend.channel("CH1").is_some());
        assert!(backend.channel("CH2").is_none());
    }
}
