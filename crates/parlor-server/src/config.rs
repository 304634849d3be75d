//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (PARLOR_HOST, PARLOR_PORT)
//! - TOML configuration file

use anyhow::{Context, Result};
use parlor_core::{HubConfig, PumpConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

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

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Keepalive and deadline configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Presence configuration.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum number of rooms.
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,

    /// Capacity of each client's outbound queue.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Capacity of the hub's command queue.
    #[serde(default = "default_hub_queue_capacity")]
    pub hub_queue_capacity: usize,
}

/// Keepalive and deadline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Quiet period before a ping is sent, in milliseconds.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_ms: u64,

    /// Deadline for a single write, in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Time allowed for the join request, in milliseconds.
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
}

/// Presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Track presence.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Deadline for a presence call, in milliseconds.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Require a bearer token on guarded routes.
    #[serde(default)]
    pub enabled: bool,

    /// Known users and their passwords.
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Accepted bearer tokens.
    #[serde(default)]
    pub tokens: Vec<String>,
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

// Default value functions
fn default_host() -> String {
    std::env::var("PARLOR_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("PARLOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_rooms() -> usize {
    10_000
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_hub_queue_capacity() -> usize {
    1024
}

fn default_keepalive_interval() -> u64 {
    15_000 // 15 seconds
}

fn default_write_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_join_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_rpc_timeout() -> u64 {
    2_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            presence: PresenceConfig::default(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
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

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_rooms: default_max_rooms(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            hub_queue_capacity: default_hub_queue_capacity(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: default_keepalive_interval(),
            write_timeout_ms: default_write_timeout(),
            join_timeout_ms: default_join_timeout(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rpc_timeout_ms: default_rpc_timeout(),
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

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "parlor.toml",
            "/etc/parlor/parlor.toml",
            "~/.config/parlor/parlor.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
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
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address: {}:{}", self.host, self.port))
    }

    /// Hub settings.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.limits.hub_queue_capacity,
            max_rooms: self.limits.max_rooms,
        }
    }

    /// Per-connection settings.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            join_timeout: Duration::from_millis(self.heartbeat.join_timeout_ms),
            outbound_capacity: self.limits.outbound_queue_capacity,
            pump: PumpConfig {
                keepalive_interval: Duration::from_millis(self.heartbeat.keepalive_interval_ms),
                write_timeout: Duration::from_millis(self.heartbeat.write_timeout_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.limits.outbound_queue_capacity, 256);
        assert_eq!(config.heartbeat.keepalive_interval_ms, 15_000);
        assert!(config.presence.enabled);
        assert!(!config.auth.enabled);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 8080;
        assert_eq!(config.bind_addr().unwrap().port(), 8080);

        config.host = "not a host".to_string();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_rooms = 50

            [heartbeat]
            join_timeout_ms = 2500

            [auth]
            enabled = true
            tokens = ["t-1"]

            [auth.users]
            alice = "secret"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_rooms, 50);
        assert_eq!(config.limits.hub_queue_capacity, 1024);
        assert_eq!(config.auth.users.get("alice").map(String::as_str), Some("secret"));

        let session = config.session_config();
        assert_eq!(session.join_timeout, Duration::from_millis(2500));
        assert_eq!(config.hub_config().max_rooms, 50);
    }
}
