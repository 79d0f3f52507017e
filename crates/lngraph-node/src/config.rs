//! Node configuration loading and management.

use lngraph_core::{GossipConfig, RoutingConfig, ValidationConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Full configuration for an lngraph node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LnGraphConfig {
    /// Channel announcement validation.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Gossip ingestion and staleness.
    #[serde(default)]
    pub gossip: GossipConfig,

    /// Route search.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Router task settings.
    #[serde(default)]
    pub router: RouterConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Commands queued before `try_submit` reports back-pressure.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Seconds between prune sweeps. Zero disables the periodic sweep.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    /// Graph events buffered per subscriber before the oldest are dropped.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_mailbox_capacity() -> usize {
    1024
}
fn default_prune_interval_secs() -> u64 {
    3600
}
fn default_event_capacity() -> usize {
    256
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            prune_interval_secs: default_prune_interval_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl RouterConfig {
    pub fn prune_interval(&self) -> Option<Duration> {
        (self.prune_interval_secs > 0).then(|| Duration::from_secs(self.prune_interval_secs))
    }
}

impl LnGraphConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: LnGraphConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lngraph_core::ChainHash;

    #[test]
    fn test_default_config() {
        let config = LnGraphConfig::default();
        assert_eq!(config.router.mailbox_capacity, 1024);
        assert_eq!(config.routing.max_hops, 20);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.validation.chain_hash, ChainHash::BITCOIN);
    }

    #[test]
    fn test_prune_interval_zero_disables() {
        let mut config = RouterConfig::default();
        assert_eq!(config.prune_interval(), Some(Duration::from_secs(3600)));
        config.prune_interval_secs = 0;
        assert_eq!(config.prune_interval(), None);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = LnGraphConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let decoded: LnGraphConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(decoded.router.mailbox_capacity, config.router.mailbox_capacity);
        assert_eq!(decoded.validation.retry, config.validation.retry);
        assert_eq!(decoded.validation.chain_hash, config.validation.chain_hash);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let config = LnGraphConfig::load(Path::new("/nonexistent/lngraph.toml")).unwrap();
        assert_eq!(config.gossip.stale_channel_secs, 1_209_600);
    }

    #[test]
    fn test_config_save_then_load() {
        let path = std::env::temp_dir()
            .join(format!("lngraph-config-{}", std::process::id()))
            .join("lngraph.toml");
        let mut config = LnGraphConfig::default();
        config.routing.max_hops = 7;
        config.save(&path).unwrap();
        let loaded = LnGraphConfig::load(&path).unwrap();
        assert_eq!(loaded.routing.max_hops, 7);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_config_from_toml_partial() {
        let toml_str = r#"
[router]
mailbox_capacity = 16

[validation.retry]
max_attempts = 2

[logging]
format = "json"
"#;
        let config: LnGraphConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.router.mailbox_capacity, 16);
        assert_eq!(config.validation.retry.max_attempts, 2);
        assert_eq!(config.logging.format, "json");
        // Defaults for unspecified
        assert_eq!(config.router.prune_interval_secs, 3600);
        assert_eq!(config.validation.max_pending, 1000);
    }
}
