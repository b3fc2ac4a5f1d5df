//! nats-dispatch Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub service: ServiceConfig,
    pub metrics: MetricsConfig,
}

/// NATS connection and subscription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Comma separated `host:port` list, e.g. "nats-1:4222,nats-2:4222"
    pub servers: String,
    /// Queue group shared by every instance of this service
    pub queue_group: String,
    /// None reconnects forever
    pub max_reconnects: Option<usize>,
    /// Default timeout for request-style sends
    pub request_timeout_ms: u64,
    pub connection_name: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: "localhost:4222".to_string(),
            queue_group: "todo_change_me".to_string(),
            max_reconnects: None,
            request_timeout_ms: 10_000,
            connection_name: "nd-server".to_string(),
        }
    }
}

impl NatsConfig {
    /// Expand `servers` into `nats://` URLs. Entries that already carry a
    /// scheme are kept as-is.
    pub fn server_urls(&self) -> Vec<String> {
        self.servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.contains("://") {
                    s.to_string()
                } else {
                    format!("nats://{}", s)
                }
            })
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Service identity used when building subjects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: nd_common::DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nats.server_urls().is_empty() {
            return Err(ConfigError::ValidationError(
                "nats.servers must list at least one server".to_string(),
            ));
        }
        if self.nats.queue_group.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "nats.queue_group must not be empty".to_string(),
            ));
        }
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service.name must not be empty".to_string(),
            ));
        }
        if self.metrics.enabled && self.metrics.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "metrics.listen_addr is not a socket address: {}",
                self.metrics.listen_addr
            )));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# nats-dispatch Configuration
# Environment variables override these settings

[nats]
servers = "localhost:4222"      # comma separated host:port list
queue_group = "todo_change_me"
# max_reconnects = 10           # unset = reconnect forever
request_timeout_ms = 10000
connection_name = "nd-server"

[service]
name = "ads-kotlin-service-template"

[metrics]
enabled = true
listen_addr = "0.0.0.0:9090"
"#
        .to_string()
    }
}
