//! The configured mutation engine.
//!
//! `TopologyEngine` binds the kernel's pure operations to the production
//! collaborators: the system clock, sequential core node naming with the
//! configured prefix, and node name URL resolution with the configured
//! scheme.

use cairn_config::CairnConfig;
use cairn_kernel::{
    ClusterState, Command, Message, NodeNameUrlResolver, SequentialCoreNodeNames, SliceMutator,
    SystemClock, WriteCommand, apply_committed, apply_committed_batch, apply_message,
};
use tracing::{debug, info};

use crate::error::{CairnError, Result};

/// The mutator type wired by [`TopologyEngine`].
pub type DefaultSliceMutator = SliceMutator<SystemClock, SequentialCoreNodeNames, NodeNameUrlResolver>;

/// Turns admin messages into write commands against a snapshot.
///
/// The engine keeps no topology of its own; every call takes the snapshot
/// to read. It is `Sync`, so one engine can serve every consumer thread.
#[derive(Debug)]
pub struct TopologyEngine {
    mutator: DefaultSliceMutator,
}

impl TopologyEngine {
    /// Creates an engine with default configuration.
    pub fn new() -> Self {
        Self::build(&CairnConfig::default())
    }

    /// Creates an engine from a configuration, validating it first.
    pub fn from_config(config: &CairnConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Loads configuration from the standard sources and builds an engine.
    pub fn from_env() -> Result<Self> {
        let config = CairnConfig::load().map_err(CairnError::ConfigLoad)?;
        Ok(Self::build(&config))
    }

    fn build(config: &CairnConfig) -> Self {
        info!(
            url_scheme = %config.cluster.url_scheme,
            core_node_prefix = %config.replicas.core_node_prefix,
            "topology engine configured"
        );
        let mutator = SliceMutator::new(
            SystemClock::new(),
            SequentialCoreNodeNames::new(&config.replicas.core_node_prefix),
            NodeNameUrlResolver,
        )
        .with_url_scheme(&config.cluster.url_scheme);
        Self { mutator }
    }

    /// Decodes and applies one admin message.
    pub fn process(&self, state: &ClusterState, message: &Message) -> Result<WriteCommand> {
        let write = apply_message(&self.mutator, state, message)?;
        debug!(?write, "processed message");
        Ok(write)
    }

    /// Applies one already-decoded command.
    pub fn apply(&self, state: &ClusterState, command: Command) -> Result<WriteCommand> {
        Ok(apply_committed(&self.mutator, state, command)?)
    }

    /// Applies commands in order, returning the final snapshot and every
    /// write.
    pub fn replay(
        &self,
        state: ClusterState,
        commands: Vec<Command>,
    ) -> Result<(ClusterState, Vec<WriteCommand>)> {
        Ok(apply_committed_batch(&self.mutator, state, commands)?)
    }

    pub fn mutator(&self) -> &DefaultSliceMutator {
        &self.mutator
    }
}

impl Default for TopologyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_kernel::command::{Operation, keys};
    use cairn_types::{Collection, Slice, SliceState};

    fn state() -> ClusterState {
        ClusterState::new().with_collection(
            Collection::new("films").with_slice(Slice::new("shard1", "films", SliceState::Active)),
        )
    }

    fn add_replica() -> Message {
        Message::for_operation(Operation::AddReplica)
            .with(keys::COLLECTION, "films")
            .with(keys::SHARD, "shard1")
            .with(keys::NODE_NAME, "10.0.0.1:8983_solr")
            .with(keys::CORE_NAME, "films_shard1_replica_n1")
    }

    #[test]
    fn engine_uses_configured_collaborators() {
        let mut config = CairnConfig::https();
        config.replicas.core_node_prefix = "replica_".to_string();
        let engine = TopologyEngine::from_config(&config).unwrap();

        let write = engine.process(&state(), &add_replica()).unwrap();
        let snapshot = write.snapshot().unwrap();
        let replica = snapshot.replica("replica_1").expect("prefixed name");
        assert_eq!(replica.base_url, "https://10.0.0.1:8983/solr");
        assert_eq!(engine.mutator().url_scheme(), "https");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = CairnConfig::default();
        config.cluster.url_scheme = "ftp".to_string();
        let err = TopologyEngine::from_config(&config).unwrap_err();
        assert!(matches!(err, CairnError::Config(_)));
    }

    #[test]
    fn shard_state_timestamps_come_from_the_clock() {
        let engine = TopologyEngine::new();
        let message = Message::for_operation(Operation::UpdateShardState)
            .with(keys::COLLECTION, "films")
            .with("shard1", "inactive");

        let write = engine.process(&state(), &message).unwrap();
        let stamped = write.snapshot().unwrap().slice("shard1").unwrap().state_timestamp();
        assert!(stamped.is_some_and(|ts| ts.as_nanos() > 0));
    }

    #[test]
    fn errors_are_classified() {
        let engine = TopologyEngine::new();

        let unknown_shard = Message::for_operation(Operation::UpdateShardState)
            .with(keys::COLLECTION, "films")
            .with("shard9", "active");
        assert!(engine.process(&state(), &unknown_shard).unwrap_err().is_invariant_violation());

        let missing_field = Message::for_operation(Operation::AddReplica)
            .with(keys::COLLECTION, "films");
        assert!(engine.process(&state(), &missing_field).unwrap_err().is_decode());
    }

    #[test]
    fn replay_matches_step_by_step_processing() {
        let engine = TopologyEngine::new();
        let command = Command::decode(&add_replica()).unwrap();

        let (replayed, writes) = engine.replay(state(), vec![command.clone()]).unwrap();
        let single = engine.apply(&state(), command).unwrap();

        assert_eq!(writes, vec![single.clone()]);
        assert_eq!(replayed, state().apply_write(&single));
    }
}
