//! The files a control-plane node reads its topology settings from.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// One file-backed configuration layer.
///
/// Layers are merged in [`ConfigLayer::ALL`] order, so a later layer
/// overrides an earlier one. Environment variables sit above all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigLayer {
    /// Per-operator defaults under the XDG config directory.
    User,
    /// The node's deployed `cairn.toml`.
    Node,
    /// Untracked overrides next to `cairn.toml`.
    Local,
}

impl ConfigLayer {
    /// Every layer, lowest precedence first.
    pub const ALL: [ConfigLayer; 3] = [ConfigLayer::User, ConfigLayer::Node, ConfigLayer::Local];

    pub fn file_name(self) -> &'static str {
        match self {
            ConfigLayer::User => "config.toml",
            ConfigLayer::Node => "cairn.toml",
            ConfigLayer::Local => "cairn.local.toml",
        }
    }

    /// Where this layer lives for a node whose config directory is
    /// `node_dir`.
    ///
    /// `None` for the user layer when the platform has no home directory.
    pub fn locate(self, node_dir: &Path) -> Option<PathBuf> {
        match self {
            ConfigLayer::User => ProjectDirs::from("dev", "Cairn", "cairn")
                .map(|dirs| dirs.config_dir().join(self.file_name())),
            ConfigLayer::Node | ConfigLayer::Local => Some(node_dir.join(self.file_name())),
        }
    }
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConfigLayer::User => "user",
            ConfigLayer::Node => "node",
            ConfigLayer::Local => "local",
        };
        f.write_str(name)
    }
}
