//! Merges the configuration layers and the environment into one
//! validated [`CairnConfig`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use tracing::{debug, warn};

use crate::{CairnConfig, ConfigLayer};

/// Default prefix for environment overrides, as in
/// `CAIRN_CLUSTER__URL_SCHEME=https`.
pub const DEFAULT_ENV_PREFIX: &str = "CAIRN";

/// Loads a node's configuration.
///
/// Sources, lowest precedence first: built-in defaults, each
/// [`ConfigLayer`] that exists on disk, then environment variables.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    node_dir: PathBuf,
    env_prefix: String,
    user_layer: bool,
}

impl ConfigLoader {
    /// Loader for the node config in the current directory.
    pub fn new() -> Self {
        Self {
            node_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            user_layer: true,
        }
    }

    /// Reads `cairn.toml` and `cairn.local.toml` from `dir`.
    pub fn with_node_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.node_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skips the per-operator layer, so only the node's own files count.
    pub fn without_user_layer(mut self) -> Self {
        self.user_layer = false;
        self
    }

    /// Layer files that exist for this loader, lowest precedence first.
    pub fn present_layers(&self) -> Vec<(ConfigLayer, PathBuf)> {
        ConfigLayer::ALL
            .into_iter()
            .filter(|layer| self.user_layer || *layer != ConfigLayer::User)
            .filter_map(|layer| layer.locate(&self.node_dir).map(|path| (layer, path)))
            .filter(|(_, path)| path.is_file())
            .collect()
    }

    /// Merges every source and validates the result.
    ///
    /// # Errors
    ///
    /// Fails when a layer does not parse, a value has the wrong type, or the
    /// merged configuration is rejected by [`CairnConfig::validate`].
    pub fn load(&self) -> Result<CairnConfig> {
        let defaults = Config::try_from(&CairnConfig::default())
            .context("Failed to seed configuration defaults")?;

        let builder = self
            .present_layers()
            .into_iter()
            .fold(Config::builder().add_source(defaults), |builder, (layer, path)| {
                debug!(%layer, path = %path.display(), "loading config layer");
                builder.add_source(File::from(path).format(FileFormat::Toml))
            })
            // Keys contain underscores, so sections are split on a double one
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: CairnConfig = builder
            .build()
            .context("Failed to merge configuration layers")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .validate()
            .context("Configuration failed validation")?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but falls back to defaults with a warning.
    pub fn load_or_default(&self) -> CairnConfig {
        self.load().unwrap_or_else(|err| {
            warn!("using default configuration: {err:#}");
            CairnConfig::default()
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path, prefix: &str) -> ConfigLoader {
        ConfigLoader::new()
            .with_node_dir(dir)
            .with_env_prefix(prefix)
            .without_user_layer()
    }

    #[test]
    fn empty_node_dir_yields_defaults() {
        let dir = tempdir().expect("Failed to create temp dir");
        let loader = loader(dir.path(), "CAIRN_TEST_DEFAULTS");

        assert!(loader.present_layers().is_empty());
        assert_eq!(
            loader.load().expect("Failed to load config"),
            CairnConfig::default()
        );
    }

    #[test]
    fn node_layer_sets_collaborator_settings() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            dir.path().join("cairn.toml"),
            "[cluster]\nurl_scheme = \"https\"\n\n[replicas]\ncore_node_prefix = \"replica_\"\n",
        )
        .expect("Failed to write config");

        let config = loader(dir.path(), "CAIRN_TEST_NODE")
            .load()
            .expect("Failed to load config");
        assert_eq!(config.cluster.url_scheme, "https");
        assert_eq!(config.replicas.core_node_prefix, "replica_");
    }

    #[test]
    fn local_layer_overrides_node_layer_key_by_key() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            dir.path().join("cairn.toml"),
            "[cluster]\nurl_scheme = \"https\"\n\n[replicas]\ncore_node_prefix = \"replica_\"\n",
        )
        .expect("Failed to write node config");
        fs::write(
            dir.path().join("cairn.local.toml"),
            "[cluster]\nurl_scheme = \"http\"\n",
        )
        .expect("Failed to write local config");

        let loader = loader(dir.path(), "CAIRN_TEST_LOCAL");
        let layers: Vec<_> = loader.present_layers().into_iter().map(|(l, _)| l).collect();
        assert_eq!(layers, vec![ConfigLayer::Node, ConfigLayer::Local]);

        let config = loader.load().expect("Failed to load config");
        assert_eq!(config.cluster.url_scheme, "http");
        assert_eq!(config.replicas.core_node_prefix, "replica_");
    }

    #[test]
    fn unsupported_scheme_is_rejected_after_merging() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            dir.path().join("cairn.toml"),
            "[cluster]\nurl_scheme = \"gopher\"\n",
        )
        .expect("Failed to write config");

        let loader = loader(dir.path(), "CAIRN_TEST_INVALID");
        let err = loader.load().unwrap_err();
        assert!(format!("{err:#}").contains("gopher"));
        assert_eq!(loader.load_or_default(), CairnConfig::default());
    }

    #[test]
    fn malformed_layer_fails_to_load() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("cairn.local.toml"), "[cluster\n")
            .expect("Failed to write config");

        assert!(loader(dir.path(), "CAIRN_TEST_MALFORMED").load().is_err());
    }

    // Environment overrides are not exercised here: the process environment
    // is shared across test threads. In use they look like
    //
    // CAIRN_CLUSTER__URL_SCHEME=https
    // CAIRN_REPLICAS__CORE_NODE_PREFIX=replica_
}
