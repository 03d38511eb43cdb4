//! Configuration management for Cairn
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (`CAIRN_<SECTION>__<KEY>`, highest precedence)
//! 2. cairn.local.toml (untracked node overrides)
//! 3. cairn.toml (the node's deployed config)
//! 4. ~/.config/cairn/config.toml (operator defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The settings pick the kernel collaborators: the URL scheme handed to the
//! base URL resolver and the prefix for assigned core node names.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod layer;
mod loader;

pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};

/// URL schemes the base URL resolver accepts.
pub const SUPPORTED_URL_SCHEMES: &[&str] = &["http", "https"];

/// Main Cairn configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    pub cluster: ClusterConfig,
    pub replicas: ReplicaConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Scheme used when resolving a node name to its base URL.
    pub url_scheme: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url_scheme: "http".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Prefix for core node names assigned to new replicas.
    pub core_node_prefix: String,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            core_node_prefix: "core_node".to_string(),
        }
    }
}

impl CairnConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration for a node whose config files live in `node_dir`
    pub fn load_from_dir(node_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_node_dir(node_dir).load()
    }

    /// Parse a single TOML document. Missing sections take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML, e.g. to write a starter `cairn.toml`.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a configuration for TLS-terminated clusters
    pub fn https() -> Self {
        Self {
            cluster: ClusterConfig {
                url_scheme: "https".to_string(),
            },
            ..Default::default()
        }
    }

    /// Check values the kernel collaborators cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme = self.cluster.url_scheme.as_str();
        if scheme.is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster.url_scheme must not be empty".to_string(),
            ));
        }
        if !SUPPORTED_URL_SCHEMES.contains(&scheme) {
            return Err(ConfigError::ValidationError(format!(
                "cluster.url_scheme '{scheme}' is not one of {SUPPORTED_URL_SCHEMES:?}"
            )));
        }

        let prefix = self.replicas.core_node_prefix.as_str();
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "replicas.core_node_prefix '{prefix}' must be non-empty without whitespace"
            )));
        }
        // A trailing digit would run into the numeric suffix
        if prefix.ends_with(|c: char| c.is_ascii_digit()) {
            return Err(ConfigError::ValidationError(format!(
                "replicas.core_node_prefix '{prefix}' must not end in a digit"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CairnConfig::default();
        assert_eq!(config.cluster.url_scheme, "http");
        assert_eq!(config.replicas.core_node_prefix, "core_node");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_https_config() {
        let config = CairnConfig::https();
        assert_eq!(config.cluster.url_scheme, "https");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CairnConfig::from_toml_str("[cluster]\nurl_scheme = \"https\"\n").unwrap();
        assert_eq!(config.cluster.url_scheme, "https");
        assert_eq!(config.replicas.core_node_prefix, "core_node");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = CairnConfig::from_toml_str("[cluster\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = CairnConfig::https();
        let text = config.to_toml_string().unwrap();
        assert_eq!(CairnConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = CairnConfig::default();
        config.cluster.url_scheme = String::new();
        assert!(config.validate().is_err());

        config.cluster.url_scheme = "ftp".to_string();
        assert!(config.validate().is_err());

        let mut config = CairnConfig::default();
        config.replicas.core_node_prefix = String::new();
        assert!(config.validate().is_err());

        config.replicas.core_node_prefix = "core node".to_string();
        assert!(config.validate().is_err());

        config.replicas.core_node_prefix = "node2".to_string();
        assert!(config.validate().is_err());

        config.replicas.core_node_prefix = "replica_".to_string();
        assert!(config.validate().is_ok());
    }
}
