//! # Cairn
//!
//! Control-plane topology mutation for a sharded, replicated search cluster.
//!
//! Cairn turns administrative operations (add a replica, promote a leader,
//! change a shard's lifecycle state, install a shard-split routing rule)
//! into immutable snapshots of cluster topology, expressed as write
//! commands for a versioned coordination store. The core is pure: it can be
//! replayed and retried without touching the network or storage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Cairn                             │
//! │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   ┌─────────┐ │
//! │  │ Message │ → │ Command  │ → │    Kernel    │ → │  Write  │ │
//! │  │ (admin) │   │ (decode) │   │ (pure mutate)│   │ Command │ │
//! │  └─────────┘   └──────────┘   └──────────────┘   └─────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use cairn::{InMemoryTopology, Message, Operation, TopologyEngine, keys};
//!
//! let topology = InMemoryTopology::new(TopologyEngine::from_env()?);
//! topology.create_collection(collection)?;
//!
//! let write = topology.submit(
//!     &Message::for_operation(Operation::Leader)
//!         .with(keys::COLLECTION, "films")
//!         .with(keys::SHARD, "shard1")
//!         .with(keys::BASE_URL, "http://10.0.0.2:8983/solr")
//!         .with(keys::CORE_NAME, "films_shard1_replica_n2"),
//! )?;
//! ```
//!
//! # Modules
//!
//! - **Engine**: [`TopologyEngine`] - kernel wired to production collaborators
//! - **Embedding**: [`InMemoryTopology`] - serialized submit path over a shared snapshot
//! - **Foundation**: Topology types, kernel operations, configuration

mod engine;
mod error;
mod topology;

// Facade
pub use engine::{DefaultSliceMutator, TopologyEngine};
pub use error::{CairnError, Result};
pub use topology::InMemoryTopology;

// Re-export topology model
pub use cairn_types::{
    Collection, CollectionName, CoreNodeName, Hash, NodeName, Replica, ReplicaState, ReplicaType,
    RoutingRule, ShardName, Slice, SliceState, Timestamp,
};

// Re-export kernel types
pub use cairn_kernel::command::keys;
pub use cairn_kernel::{
    ClusterState, Command, DecodeError, KernelError, Message, Operation, WriteCommand,
};

// Re-export configuration
pub use cairn_config::{CairnConfig, ConfigError, ConfigLayer, ConfigLoader};
