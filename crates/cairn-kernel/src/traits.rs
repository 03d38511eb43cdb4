//! Collaborators the kernel consumes but does not implement.
//!
//! Each trait is injected into the [`SliceMutator`](crate::SliceMutator) so
//! production and tests can supply their own time source, naming policy,
//! and address resolution.

use cairn_types::{Collection, CoreNodeName, NodeName, Timestamp};

/// Epoch-based time source used to stamp shard state changes.
///
/// Readings must stay ordered across control-plane restarts, so
/// implementations report time since the Unix epoch rather than a
/// process-local monotonic counter.
pub trait Clock {
    /// Returns the current time as nanoseconds since the Unix epoch.
    fn epoch_now(&self) -> Timestamp;
}

/// Policy that picks a fresh replica identity within a collection.
pub trait CoreNodeNameAssigner {
    /// Returns a core node name not used by any replica of `collection`.
    fn assign(&self, collection: &Collection) -> CoreNodeName;
}

/// Resolves a node name to the base URL its replicas are reachable at.
pub trait BaseUrlResolver {
    /// Returns the base URL for `node_name` under `url_scheme`.
    fn base_url(&self, node_name: &NodeName, url_scheme: &str) -> String;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn epoch_now(&self) -> Timestamp {
        (**self).epoch_now()
    }
}

impl<T: CoreNodeNameAssigner + ?Sized> CoreNodeNameAssigner for &T {
    fn assign(&self, collection: &Collection) -> CoreNodeName {
        (**self).assign(collection)
    }
}

impl<T: BaseUrlResolver + ?Sized> BaseUrlResolver for &T {
    fn base_url(&self, node_name: &NodeName, url_scheme: &str) -> String {
        (**self).base_url(node_name, url_scheme)
    }
}
