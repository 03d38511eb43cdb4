//! The kernel - pure functional core of `Cairn`.
//!
//! The kernel applies committed topology commands to a cluster snapshot and
//! answers with the single write the persistence layer should perform. It
//! performs no IO; time, naming, and addressing come in through the
//! collaborators held by the [`SliceMutator`].
//!
//! # Example
//!
//! ```ignore
//! let state = ClusterState::new().with_collection(collection);
//! let msg = Message::for_operation(Operation::Leader)
//!     .with("collection", "films")
//!     .with("shard", "shard1")
//!     .with("base_url", "http://n1:8983/solr")
//!     .with("core_name", "films_shard1_replica1");
//!
//! let write = apply_message(&mutator, &state, &msg)?;
//! // Persistence layer executes the write...
//! ```

use cairn_types::CollectionName;
use tracing::{debug, trace};

use crate::collection_mutator::check_collection_key_existence;
use crate::command::{Command, DecodeError, Message, Operation};
use crate::effects::WriteCommand;
use crate::slice_mutator::SliceMutator;
use crate::state::ClusterState;
use crate::traits::{BaseUrlResolver, Clock, CoreNodeNameAssigner};

/// Applies one decoded command to a snapshot.
///
/// The snapshot is borrowed, never modified; the returned write describes
/// the change.
pub fn apply_committed<C, A, R>(
    mutator: &SliceMutator<C, A, R>,
    state: &ClusterState,
    cmd: Command,
) -> Result<WriteCommand, KernelError>
where
    C: Clock,
    A: CoreNodeNameAssigner,
    R: BaseUrlResolver,
{
    let operation = cmd.operation();
    let collection = cmd.collection().clone();

    let write = match &cmd {
        Command::AddReplica(c) => mutator.add_replica(state, c),
        Command::RemoveReplica(c) => mutator.remove_replica(state, c),
        Command::SetShardLeader(c) => mutator.set_shard_leader(state, c),
        Command::UpdateShardState(c) => mutator.update_shard_state(state, c),
        Command::AddRoutingRule(c) => mutator.add_routing_rule(state, c),
        Command::RemoveRoutingRule(c) => mutator.remove_routing_rule(state, c),
        Command::AddReplicaProperty(c) => mutator.add_replica_property(state, c),
        Command::DeleteReplicaProperty(c) => mutator.delete_replica_property(state, c),
    }?;

    // Postcondition: a write only ever touches the command's own collection
    if let Some(target) = write.collection() {
        assert_eq!(
            target, &collection,
            "{operation} on '{collection}' produced a write for '{target}'"
        );
    }
    // Postcondition: no slice ends up with more leaders than it started
    // with, and a slice that had at most one still has at most one
    if let Some(snapshot) = write.snapshot() {
        let before = state.get_collection(collection.as_str());
        debug_assert!(
            snapshot.slices().iter().all(|(name, slice)| {
                let prior = before
                    .and_then(|c| c.slice(name.as_str()))
                    .map_or(0, |s| s.leader_count());
                slice.leader_count() <= prior.max(1)
            }),
            "{operation} added a leader to a slice of '{collection}'"
        );
    }

    trace!(%operation, %collection, ?write, "applied command");
    Ok(write)
}

/// Applies a raw admin-layer message.
///
/// A message without a collection name is skipped with a `NoOp` before any
/// decoding happens.
pub fn apply_message<C, A, R>(
    mutator: &SliceMutator<C, A, R>,
    state: &ClusterState,
    message: &Message,
) -> Result<WriteCommand, KernelError>
where
    C: Clock,
    A: CoreNodeNameAssigner,
    R: BaseUrlResolver,
{
    if !check_collection_key_existence(message) {
        return Ok(WriteCommand::NoOp);
    }
    let cmd = Command::decode(message)?;
    apply_committed(mutator, state, cmd)
}

/// Applies commands in order, folding each write into the snapshot the next
/// command sees.
///
/// Stops at the first error; nothing from the batch is returned in that
/// case.
pub fn apply_committed_batch<C, A, R>(
    mutator: &SliceMutator<C, A, R>,
    state: ClusterState,
    commands: Vec<Command>,
) -> Result<(ClusterState, Vec<WriteCommand>), KernelError>
where
    C: Clock,
    A: CoreNodeNameAssigner,
    R: BaseUrlResolver,
{
    let mut writes = Vec::with_capacity(commands.len());
    let mut state = state;

    for cmd in commands {
        let write = apply_committed(mutator, &state, cmd)?;
        state = state.apply_write(&write);
        writes.push(write);
    }

    debug!(writes = writes.len(), "applied batch");
    Ok((state, writes))
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A command contradicts the snapshot in a way its sender should have
    /// prevented, such as naming a shard the collection does not have.
    #[error("invariant violated for collection '{collection}': {detail}")]
    InvariantViolation {
        operation: Option<Operation>,
        collection: CollectionName,
        detail: String,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
