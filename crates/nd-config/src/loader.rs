//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "application.toml",
    "nats-dispatch.toml",
    "./config/config.toml",
    "/etc/nats-dispatch/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with(|key| env::var(key).ok())
    }

    fn load_with<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, lookup);
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("ND_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply overrides from a variable lookup. `NATS_SERVERS` is honoured for
/// deployments that still export the old variable; `ND_NATS_SERVERS` wins.
fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // NATS
    if let Some(val) = lookup("NATS_SERVERS") {
        config.nats.servers = val;
    }
    if let Some(val) = lookup("ND_NATS_SERVERS") {
        config.nats.servers = val;
    }
    if let Some(val) = lookup("ND_NATS_QUEUE_GROUP") {
        config.nats.queue_group = val;
    }
    if let Some(val) = lookup("ND_NATS_MAX_RECONNECTS") {
        // negative or unparsable means unlimited
        config.nats.max_reconnects = val.parse().ok();
    }
    if let Some(val) = lookup("ND_NATS_REQUEST_TIMEOUT_MS") {
        if let Ok(timeout) = val.parse() {
            config.nats.request_timeout_ms = timeout;
        }
    }

    // Service
    if let Some(val) = lookup("ND_SERVICE_NAME") {
        config.service.name = val;
    }

    // Metrics
    if let Some(val) = lookup("ND_METRICS_ENABLED") {
        config.metrics.enabled = val.parse().unwrap_or(true);
    }
    if let Some(val) = lookup("ND_METRICS_LISTEN_ADDR") {
        config.metrics.listen_addr = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("ND_NATS_SERVERS", "a:1,b:2"),
                ("ND_NATS_QUEUE_GROUP", "cats"),
                ("ND_NATS_MAX_RECONNECTS", "5"),
                ("ND_NATS_REQUEST_TIMEOUT_MS", "250"),
                ("ND_SERVICE_NAME", "cat-service"),
                ("ND_METRICS_ENABLED", "false"),
            ]),
        );

        assert_eq!(config.nats.server_urls(), vec!["nats://a:1", "nats://b:2"]);
        assert_eq!(config.nats.queue_group, "cats");
        assert_eq!(config.nats.max_reconnects, Some(5));
        assert_eq!(config.nats.request_timeout_ms, 250);
        assert_eq!(config.service.name, "cat-service");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_prefixed_servers_win_over_legacy_variable() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[("NATS_SERVERS", "legacy:4222"), ("ND_NATS_SERVERS", "new:4222")]),
        );
        assert_eq!(config.nats.servers, "new:4222");

        let mut config = AppConfig::default();
        apply_overrides(&mut config, lookup_from(&[("NATS_SERVERS", "legacy:4222")]));
        assert_eq!(config.nats.servers, "legacy:4222");
    }

    #[test]
    fn test_negative_max_reconnects_means_unlimited() {
        let mut config = AppConfig::default();
        config.nats.max_reconnects = Some(3);
        apply_overrides(&mut config, lookup_from(&[("ND_NATS_MAX_RECONNECTS", "-1")]));
        assert_eq!(config.nats.max_reconnects, None);
    }

    #[test]
    fn test_loader_reads_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[nats]\nqueue_group = \"from-file\"").unwrap();

        let config = ConfigLoader::with_path(file.path()).load_with(lookup_from(&[])).unwrap();
        assert_eq!(config.nats.queue_group, "from-file");

        let config = ConfigLoader::with_path(file.path())
            .load_with(lookup_from(&[("ND_NATS_QUEUE_GROUP", "from-env")]))
            .unwrap();
        assert_eq!(config.nats.queue_group, "from-env");
    }

    #[test]
    fn test_loader_surfaces_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[nats\nservers = ").unwrap();

        let result = ConfigLoader::with_path(file.path()).load_with(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
