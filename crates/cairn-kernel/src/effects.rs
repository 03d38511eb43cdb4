//! Write commands produced by the kernel.
//!
//! A write command is the only thing a mutation hands to the persistence
//! layer. The kernel is pure - it describes the write but never performs
//! it. The persistence layer applies it with a compare-and-swap against the
//! stored version, and on conflict re-runs the mutation against a fresh
//! snapshot instead of retrying the stale command.

use std::sync::Arc;

use cairn_types::{Collection, CollectionName};
use serde::{Deserialize, Serialize};

/// The outcome of exactly one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteCommand {
    /// Topology is unchanged; nothing needs to be written.
    NoOp,

    /// Remove the persisted record of a collection entirely.
    Delete {
        /// The collection whose record is removed.
        collection: CollectionName,
    },

    /// Replace the persisted record of a collection with a new snapshot.
    Replace {
        /// The collection being rewritten.
        collection: CollectionName,
        /// The complete new snapshot.
        snapshot: Arc<Collection>,
    },
}

impl WriteCommand {
    /// Builds a `Replace` keyed by the snapshot's own name.
    pub fn replace(snapshot: Collection) -> Self {
        WriteCommand::Replace {
            collection: snapshot.name().clone(),
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn delete(collection: impl Into<CollectionName>) -> Self {
        WriteCommand::Delete {
            collection: collection.into(),
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, WriteCommand::NoOp)
    }

    /// The collection this command writes, if any.
    pub fn collection(&self) -> Option<&CollectionName> {
        match self {
            WriteCommand::NoOp => None,
            WriteCommand::Delete { collection } | WriteCommand::Replace { collection, .. } => {
                Some(collection)
            }
        }
    }

    /// The replacement snapshot, for `Replace` commands.
    pub fn snapshot(&self) -> Option<&Arc<Collection>> {
        match self {
            WriteCommand::Replace { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }
}
