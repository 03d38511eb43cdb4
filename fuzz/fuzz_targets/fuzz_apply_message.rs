#![no_main]

use libfuzzer_sys::fuzz_target;

use cairn_kernel::command::{Message, Operation, keys};
use cairn_kernel::kernel::apply_message;
use cairn_kernel::runtime::{FixedClock, NodeNameUrlResolver, SequentialCoreNodeNames};
use cairn_kernel::slice_mutator::SliceMutator;
use cairn_kernel::state::ClusterState;
use cairn_types::{Collection, Replica, Slice, SliceState};

const OPERATIONS: [Operation; 8] = [
    Operation::AddReplica,
    Operation::RemoveReplica,
    Operation::Leader,
    Operation::UpdateShardState,
    Operation::AddRoutingRule,
    Operation::RemoveRoutingRule,
    Operation::AddReplicaProp,
    Operation::DeleteReplicaProp,
];

const KEYS: [&str; 16] = [
    keys::SHARD,
    keys::CORE_NODE_NAME,
    keys::NODE_NAME,
    keys::CORE_NAME,
    keys::STATE,
    keys::BASE_URL,
    keys::REPLICA_TYPE,
    keys::ROUTE_KEY,
    keys::RANGE,
    keys::TARGET_COLLECTION,
    keys::EXPIRE_AT,
    keys::PROPERTY,
    keys::PROPERTY_VALUE,
    keys::SHARD_UNIQUE,
    "shard1",
    "property.rack",
];

fn seed_state() -> ClusterState {
    let slice = (1..=3).fold(
        Slice::new("shard1", "films", SliceState::Active),
        |slice, n| {
            slice.with_replica(Replica::new(
                format!("core_node{n}"),
                "films",
                "shard1",
                format!("n{n}:8983_solr"),
                format!("http://n{n}:8983/solr"),
                format!("core{n}"),
            ))
        },
    );
    ClusterState::new().with_collection(
        Collection::new("films")
            .with_slice(slice)
            .with_slice(Slice::new("shard2", "films", SliceState::Construction)),
    )
}

/// Builds a message from raw bytes: the first byte picks the operation,
/// then each chunk is `key index, value length, value bytes`.
fn message_from_bytes(data: &[u8]) -> Option<Message> {
    let (first, mut rest) = data.split_first()?;
    let mut message = Message::for_operation(OPERATIONS[*first as usize % OPERATIONS.len()])
        .with(keys::COLLECTION, "films");

    while let [key, len, tail @ ..] = rest {
        let len = (*len as usize).min(tail.len());
        let value = String::from_utf8_lossy(&tail[..len]);
        message.insert(KEYS[*key as usize % KEYS.len()], value);
        rest = &tail[len..];
    }
    Some(message)
}

fuzz_target!(|data: &[u8]| {
    // Apply a sequence of fuzzed messages to a seeded topology.
    //
    // This tests:
    // - No panics on any message sequence
    // - At most one leader per slice after every write
    // - Writes never name a collection other than the message's

    let mutator = SliceMutator::new(
        FixedClock::at_nanos(1),
        SequentialCoreNodeNames::default(),
        NodeNameUrlResolver,
    );
    let mut state = seed_state();

    for chunk in data.split(|b| *b == 0xff).take(16) {
        let Some(message) = message_from_bytes(chunk) else {
            continue;
        };

        // Decode failures and fatal invariant errors are fine
        let Ok(write) = apply_message(&mutator, &state, &message) else {
            continue;
        };

        if let Some(collection) = write.collection() {
            assert_eq!(collection.as_str(), "films");
        }
        state = state.apply_write(&write);

        for collection in state.collections().values() {
            for slice in collection.slices().values() {
                assert!(slice.leader_count() <= 1, "slice {} has several leaders", slice.name());
            }
        }
    }
});
