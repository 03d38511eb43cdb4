//! An in-process topology holder.
//!
//! `InMemoryTopology` plays the persistence layer's role for embedded use
//! and tests: it keeps the current [`ClusterState`] behind a lock, runs
//! each message through the engine against the latest snapshot, and
//! installs the resulting write. Messages are serialized by the write lock,
//! matching the single-consumer model of the control plane.

use std::sync::{Arc, RwLock};

use cairn_kernel::{ClusterState, Command, Message, WriteCommand};
use cairn_types::{Collection, Hash};
use tracing::debug;

use crate::engine::TopologyEngine;
use crate::error::{CairnError, Result};

/// Shared handle to an in-memory cluster topology.
///
/// Cloning the handle shares the same topology.
#[derive(Clone)]
pub struct InMemoryTopology {
    engine: Arc<TopologyEngine>,
    state: Arc<RwLock<ClusterState>>,
}

impl InMemoryTopology {
    /// Creates an empty topology driven by `engine`.
    pub fn new(engine: TopologyEngine) -> Self {
        Self::with_state(engine, ClusterState::new())
    }

    /// Creates a topology seeded with `state`.
    pub fn with_state(engine: TopologyEngine, state: ClusterState) -> Self {
        Self {
            engine: Arc::new(engine),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Registers a collection created outside the mutation path.
    pub fn create_collection(&self, collection: Collection) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CairnError::internal("lock poisoned"))?;
        *state = state.clone().with_collection(collection);
        Ok(())
    }

    /// Processes one admin message and installs its write.
    ///
    /// This is the core write path: message → kernel → write → install.
    pub fn submit(&self, message: &Message) -> Result<WriteCommand> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CairnError::internal("lock poisoned"))?;

        // Compute against the snapshot as of this call (pure)
        let write = self.engine.process(&state, message)?;

        // Install the write
        *state = state.apply_write(&write);
        debug!(collections = state.collection_count(), "installed write");
        Ok(write)
    }

    /// Applies one decoded command and installs its write.
    pub fn submit_command(&self, command: Command) -> Result<WriteCommand> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CairnError::internal("lock poisoned"))?;
        let write = self.engine.apply(&state, command)?;
        *state = state.apply_write(&write);
        Ok(write)
    }

    /// Returns the current snapshot.
    ///
    /// The snapshot is immutable; later submits never change it.
    pub fn snapshot(&self) -> Result<ClusterState> {
        let state = self
            .state
            .read()
            .map_err(|_| CairnError::internal("lock poisoned"))?;
        Ok(state.clone())
    }

    /// Returns the current collection snapshot, if it exists.
    pub fn collection(&self, name: &str) -> Result<Option<Arc<Collection>>> {
        let state = self
            .state
            .read()
            .map_err(|_| CairnError::internal("lock poisoned"))?;
        Ok(state.get_collection(name).cloned())
    }

    /// Digest of the current topology.
    pub fn state_hash(&self) -> Result<Hash> {
        Ok(self.snapshot()?.compute_state_hash())
    }

    pub fn engine(&self) -> &TopologyEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_kernel::command::{Operation, keys};
    use cairn_types::{Slice, SliceState};

    fn topology() -> InMemoryTopology {
        let topology = InMemoryTopology::new(TopologyEngine::new());
        topology
            .create_collection(
                Collection::new("films")
                    .with_slice(Slice::new("shard1", "films", SliceState::Active)),
            )
            .unwrap();
        topology
    }

    fn add_replica(node: &str, core: &str) -> Message {
        Message::for_operation(Operation::AddReplica)
            .with(keys::COLLECTION, "films")
            .with(keys::SHARD, "shard1")
            .with(keys::NODE_NAME, node)
            .with(keys::CORE_NAME, core)
    }

    #[test]
    fn submits_chain_through_installed_state() {
        let topology = topology();
        topology.submit(&add_replica("n1:8983_solr", "c1")).unwrap();
        topology.submit(&add_replica("n2:8983_solr", "c2")).unwrap();

        topology
            .submit(
                &Message::for_operation(Operation::Leader)
                    .with(keys::COLLECTION, "films")
                    .with(keys::SHARD, "shard1")
                    .with(keys::BASE_URL, "http://n2:8983/solr")
                    .with(keys::CORE_NAME, "c2"),
            )
            .unwrap();

        let films = topology.collection("films").unwrap().unwrap();
        let shard1 = films.slice("shard1").unwrap();
        assert_eq!(shard1.replicas().len(), 2);
        assert_eq!(shard1.leader().unwrap().name.as_str(), "core_node2");
    }

    #[test]
    fn earlier_snapshots_are_unaffected() {
        let topology = topology();
        let before = topology.snapshot().unwrap();
        let hash_before = before.compute_state_hash();

        topology.submit(&add_replica("n1:8983_solr", "c1")).unwrap();

        assert_eq!(before.compute_state_hash(), hash_before);
        assert_ne!(topology.state_hash().unwrap(), hash_before);
    }

    #[test]
    fn failed_submit_installs_nothing() {
        let topology = topology();
        let hash = topology.state_hash().unwrap();

        let bad = Message::for_operation(Operation::UpdateShardState)
            .with(keys::COLLECTION, "films")
            .with("shard9", "active");
        assert!(topology.submit(&bad).is_err());
        assert_eq!(topology.state_hash().unwrap(), hash);
    }

    #[test]
    fn removing_from_vanished_collection_deletes_it() {
        let topology = topology();
        let message = Message::for_operation(Operation::RemoveReplica)
            .with(keys::COLLECTION, "ghost")
            .with(keys::CORE_NODE_NAME, "core_node1");

        let write = topology.submit(&message).unwrap();
        assert_eq!(write, WriteCommand::delete("ghost"));
        assert!(topology.collection("films").unwrap().is_some());
    }

    #[test]
    fn handles_share_state_across_threads() {
        let topology = topology();
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let topology = topology.clone();
                std::thread::spawn(move || {
                    topology
                        .submit(&add_replica(&format!("n{n}:8983_solr"), &format!("c{n}")))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let films = topology.collection("films").unwrap().unwrap();
        assert_eq!(films.slice("shard1").unwrap().replicas().len(), 4);
    }
}
