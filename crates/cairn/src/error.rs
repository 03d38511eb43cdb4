//! Error types for the Cairn facade.

use cairn_config::ConfigError;
use cairn_kernel::{DecodeError, KernelError};

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, CairnError>;

/// Errors surfaced by [`TopologyEngine`](crate::TopologyEngine) and
/// [`InMemoryTopology`](crate::InMemoryTopology).
#[derive(thiserror::Error, Debug)]
pub enum CairnError {
    /// The kernel rejected a command.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Loading configuration from its sources failed.
    #[error("failed to load configuration: {0:#}")]
    ConfigLoad(anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CairnError {
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True if the message itself was malformed, as opposed to contradicting
    /// the topology.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Kernel(KernelError::Decode(_)))
    }

    /// True for the fatal class: the command names a shard the collection
    /// does not have.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Kernel(KernelError::InvariantViolation { .. }))
    }
}

impl From<DecodeError> for CairnError {
    fn from(err: DecodeError) -> Self {
        Self::Kernel(KernelError::Decode(err))
    }
}
