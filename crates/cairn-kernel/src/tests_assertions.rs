//! Tests for the kernel's production postcondition assertions
//!
//! The mutators assert their invariants with `assert!()` before returning.
//! These tests drive each asserted path through normal operations so a
//! regression shows up as a panic here rather than in a live control plane.

#[cfg(test)]
mod tests {
    use cairn_types::{Collection, Replica, Slice, SliceState};

    use crate::command::{Message, Operation, keys};
    use crate::effects::WriteCommand;
    use crate::kernel::{KernelError, apply_message};
    use crate::runtime::{FixedClock, NodeNameUrlResolver, SequentialCoreNodeNames};
    use crate::slice_mutator::SliceMutator;
    use crate::state::ClusterState;
    use test_case::test_case;

    fn mutator() -> SliceMutator<FixedClock, SequentialCoreNodeNames, NodeNameUrlResolver> {
        SliceMutator::new(
            FixedClock::at_nanos(1),
            SequentialCoreNodeNames::default(),
            NodeNameUrlResolver,
        )
    }

    /// A corrupted slice where every replica believes it leads.
    fn all_leaders() -> ClusterState {
        let slice = (1..=3).fold(
            Slice::new("shard1", "films", SliceState::Active),
            |slice, n| {
                slice.with_replica(
                    Replica::new(
                        format!("core_node{n}"),
                        "films",
                        "shard1",
                        format!("n{n}:8983_solr"),
                        format!("http://n{n}:8983/solr"),
                        format!("core{n}"),
                    )
                    .with_leader(true),
                )
            },
        );
        ClusterState::new().with_collection(Collection::new("films").with_slice(slice))
    }

    #[test]
    fn leader_election_repairs_multiple_leaders() {
        // Tests assertion: at most one leader per slice after election
        let message = Message::for_operation(Operation::Leader)
            .with(keys::COLLECTION, "films")
            .with(keys::SHARD, "shard1")
            .with(keys::BASE_URL, "http://n2:8983/solr")
            .with(keys::CORE_NAME, "core2");

        let write = apply_message(&mutator(), &all_leaders(), &message).unwrap();
        let snapshot = write.snapshot().expect("leader change rewrites the collection");
        let slice = snapshot.slice("shard1").unwrap();

        assert_eq!(slice.leader_count(), 1, "exactly one leader must remain");
        assert_eq!(slice.leader().unwrap().name.as_str(), "core_node2");
    }

    #[test_case(Message::for_operation(Operation::RemoveReplica)
        .with(keys::CORE_NODE_NAME, "core_node9"), 3; "remove absent replica")]
    #[test_case(Message::for_operation(Operation::RemoveReplica)
        .with(keys::CORE_NODE_NAME, "core_node1"), 2; "remove one leader")]
    #[test_case(Message::for_operation(Operation::AddReplica)
        .with(keys::SHARD, "shard1")
        .with(keys::NODE_NAME, "n4:8983_solr")
        .with(keys::CORE_NAME, "core4"), 3; "add replica")]
    #[test_case(Message::for_operation(Operation::UpdateShardState)
        .with("shard1", "inactive"), 3; "shard state")]
    #[test_case(Message::for_operation(Operation::AddRoutingRule)
        .with(keys::SHARD, "shard1")
        .with(keys::ROUTE_KEY, "k!")
        .with(keys::RANGE, "0-10")
        .with(keys::TARGET_COLLECTION, "books")
        .with(keys::EXPIRE_AT, "100"), 3; "routing rule")]
    fn stale_multiple_leaders_pass_through_other_operations(message: Message, leaders: usize) {
        // Tests assertion: operations never add leaders, but may carry
        // leaders they did not touch
        let message = message.with(keys::COLLECTION, "films");
        let write = apply_message(&mutator(), &all_leaders(), &message).unwrap();
        let slice = write
            .snapshot()
            .and_then(|snapshot| snapshot.slice("shard1").cloned())
            .expect("operation rewrites the collection");

        assert_eq!(slice.leader_count(), leaders);
    }

    #[test]
    fn write_targets_the_command_collection() {
        // Tests assertion: a write only touches the command's own collection
        let state = all_leaders().with_collection(Collection::new("books"));
        let message = Message::for_operation(Operation::RemoveReplica)
            .with(keys::COLLECTION, "books")
            .with(keys::CORE_NODE_NAME, "core_node1");

        let write = apply_message(&mutator(), &state, &message).unwrap();
        assert_eq!(write.collection().map(|c| c.as_str()), Some("books"));
    }

    #[test]
    fn fatal_paths_produce_no_write() {
        // Tests assertion: invariant violations return before any write is built
        let message = Message::for_operation(Operation::UpdateShardState)
            .with(keys::COLLECTION, "films")
            .with("shard1", "active")
            .with("shard7", "active");

        let result = apply_message(&mutator(), &all_leaders(), &message);
        assert!(matches!(result, Err(KernelError::InvariantViolation { .. })));
    }

    #[test]
    fn no_op_carries_no_collection() {
        let write = WriteCommand::NoOp;
        assert!(write.is_no_op());
        assert!(write.collection().is_none());
        assert!(write.snapshot().is_none());
    }

    // Summary of Kernel Postconditions (3 total):
    //
    // 1. SetShardLeader - at most one leader per slice, and it is the
    //    requested replica
    // 2. Every operation - the write names the command's own collection
    // 3. Every Replace - no slice gains leaders; a slice with at most one
    //    leader before still has at most one after
    //
    // Fatal paths (unknown shard in shard state or routing rule updates)
    // return an error before any write is composed.
}
