//! # cairn-kernel: Topology mutation core of `Cairn`
//!
//! The kernel is the pure, deterministic heart of the control plane. It
//! receives committed topology commands and answers each with exactly one
//! write for the persistence layer.
//!
//! ## Key Principles
//!
//! - **No IO**: The kernel never touches disk, network, or the coordination store
//! - **Injected collaborators**: Time, replica naming, and URL resolution come
//!   in through [`traits`]
//! - **Copy-on-write**: Snapshots are never changed in place; untouched
//!   slices and collections are shared by `Arc`
//! - **Pure functions**: `apply_committed(mutator, state, command) -> write`
//!
//! ## Architecture
//!
//! - [`command`]: Admin messages and the typed commands decoded from them
//! - [`effects`]: The [`WriteCommand`] handed to the persistence layer
//! - [`state`]: The cluster snapshot the kernel reads
//! - [`slice_mutator`]: Shard-scoped operations (replicas, leaders, states, routing)
//! - [`collection_mutator`] and [`replica_mutator`]: Helpers one level up and down
//! - [`kernel`]: The `apply_committed` function that ties it all together
//!
//! ## Example
//!
//! ```ignore
//! use cairn_kernel::{ClusterState, Message, SliceMutator, apply_message};
//! use cairn_kernel::runtime::{NodeNameUrlResolver, SequentialCoreNodeNames, SystemClock};
//!
//! let mutator = SliceMutator::new(
//!     SystemClock::new(),
//!     SequentialCoreNodeNames::default(),
//!     NodeNameUrlResolver,
//! );
//!
//! match apply_message(&mutator, &state, &message) {
//!     Ok(write) => {
//!         // Persist the write...
//!     }
//!     Err(e) => {
//!         // Reject the message...
//!     }
//! }
//! ```

pub mod collection_mutator;
pub mod command;
pub mod effects;
pub mod kernel;
pub mod replica_mutator;
pub mod runtime;
pub mod slice_mutator;
pub mod state;
pub mod state_hash;
pub mod traits;


#[cfg(test)]
mod tests_assertions;

// Re-export commonly used items
pub use command::{Command, DecodeError, Message, Operation};
pub use effects::WriteCommand;
pub use kernel::{KernelError, apply_committed, apply_committed_batch, apply_message};
pub use runtime::{FixedClock, NodeNameUrlResolver, SequentialCoreNodeNames, SystemClock};
pub use slice_mutator::SliceMutator;
pub use state::ClusterState;
pub use traits::{BaseUrlResolver, Clock, CoreNodeNameAssigner};
