//! Cluster state snapshots.
//!
//! A [`ClusterState`] maps collection names to immutable [`Collection`]
//! snapshots held behind [`Arc`]. Mutators read a snapshot and never keep a
//! reference to it across calls; a new snapshot is composed per write,
//! sharing every collection the write did not touch.

use std::collections::BTreeMap;
use std::sync::Arc;

use cairn_types::{Collection, CollectionName};
use serde::{Deserialize, Serialize};

use crate::effects::WriteCommand;

/// The last-known topology of the whole cluster.
///
/// State uses a builder pattern - methods take ownership of `self`, change
/// the mapping, and return `self`. Cloning a state clones only the map of
/// `Arc`s, never the collections themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClusterState {
    collections: BTreeMap<CollectionName, Arc<Collection>>,
}

impl ClusterState {
    /// Creates a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collection snapshot, if it exists.
    pub fn get_collection(&self, name: &str) -> Option<&Arc<Collection>> {
        self.collections.get(name)
    }

    /// Returns true if a collection with the given name exists.
    pub fn collection_exists(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Returns the number of collections in the state.
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &CollectionName> {
        self.collections.keys()
    }

    /// Returns a reference to all collections.
    pub fn collections(&self) -> &BTreeMap<CollectionName, Arc<Collection>> {
        &self.collections
    }

    /// Adds or replaces a collection and returns the updated state.
    pub fn with_collection(mut self, collection: impl Into<Arc<Collection>>) -> Self {
        let collection = collection.into();
        self.collections
            .insert(collection.name().clone(), collection);
        self
    }

    /// Removes a collection and returns the updated state.
    ///
    /// If the collection doesn't exist, returns self unchanged.
    pub fn without_collection(mut self, name: &str) -> Self {
        self.collections.remove(name);
        self
    }

    /// Composes the state that results from persisting `write`.
    ///
    /// This is the pure half of the persistence contract: a `Replace`
    /// installs the snapshot, a `Delete` drops the collection, and a
    /// `NoOp` yields an equal state.
    pub fn apply_write(&self, write: &WriteCommand) -> ClusterState {
        match write {
            WriteCommand::NoOp => self.clone(),
            WriteCommand::Delete { collection } => {
                self.clone().without_collection(collection.as_str())
            }
            WriteCommand::Replace {
                collection,
                snapshot,
            } => {
                debug_assert_eq!(collection, snapshot.name());
                self.clone().with_collection(Arc::clone(snapshot))
            }
        }
    }
}
