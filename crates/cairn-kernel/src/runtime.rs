//! Default implementations of the kernel's collaborator traits.
//!
//! The kernel is pure and only calls these through the traits in
//! [`crate::traits`]. The runtime picks concrete implementations; tests
//! use [`FixedClock`] to keep state timestamps deterministic.
//!
//! ## Example
//!
//! ```ignore
//! use cairn_kernel::runtime::{NodeNameUrlResolver, SequentialCoreNodeNames, SystemClock};
//! use cairn_kernel::SliceMutator;
//!
//! let mutator = SliceMutator::new(
//!     SystemClock::new(),
//!     SequentialCoreNodeNames::default(),
//!     NodeNameUrlResolver,
//! )
//! .with_url_scheme("https");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use cairn_types::{Collection, CoreNodeName, NodeName, Timestamp};

use crate::traits::{BaseUrlResolver, Clock, CoreNodeNameAssigner};

/// Default prefix for assigned core node names.
pub const DEFAULT_CORE_NODE_PREFIX: &str = "core_node";

// ============================================================================
// Clocks
// ============================================================================

/// Production clock using system time.
///
/// Readings are strictly increasing per instance, even if the system
/// clock steps backwards between two calls.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn epoch_now(&self) -> Timestamp {
        let mut next = Timestamp::EPOCH;
        // The closure always returns Some, so the update cannot fail
        let _ = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                let prev = (last > 0).then(|| Timestamp::from_nanos(last));
                next = Timestamp::now_monotonic(prev);
                Some(next.as_nanos())
            });
        next
    }
}

/// Clock that always reads the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub Timestamp);

impl FixedClock {
    pub fn at_nanos(nanos: u64) -> Self {
        Self(Timestamp::from_nanos(nanos))
    }
}

impl Clock for FixedClock {
    fn epoch_now(&self) -> Timestamp {
        self.0
    }
}

// ============================================================================
// Core node naming
// ============================================================================

/// Assigns `<prefix><n>` names, where `n` is one past the highest number
/// already used in the collection (or past the replica count, whichever is
/// larger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequentialCoreNodeNames {
    prefix: String,
}

impl SequentialCoreNodeNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for SequentialCoreNodeNames {
    fn default() -> Self {
        Self::new(DEFAULT_CORE_NODE_PREFIX)
    }
}

impl CoreNodeNameAssigner for SequentialCoreNodeNames {
    fn assign(&self, collection: &Collection) -> CoreNodeName {
        let highest = collection
            .replicas()
            .filter_map(|r| r.name.as_str().strip_prefix(self.prefix.as_str()))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let floor = collection.replicas().count() as u64;

        // Wraps instead of overflowing when a suffix is u64::MAX
        let mut next = highest.max(floor).wrapping_add(1);
        loop {
            let candidate = format!("{}{next}", self.prefix);
            if collection.replica(&candidate).is_none() {
                return CoreNodeName::new(candidate);
            }
            next = next.wrapping_add(1);
        }
    }
}

// ============================================================================
// Base URL resolution
// ============================================================================

/// Resolves node names of the form `host:port_context` to
/// `scheme://host:port/context`.
///
/// The context part may be percent-encoded (`solr%2Fv2`); it is decoded
/// before being appended. A node name with no `_` separator resolves to
/// `scheme://host:port`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeNameUrlResolver;

impl BaseUrlResolver for NodeNameUrlResolver {
    fn base_url(&self, node_name: &NodeName, url_scheme: &str) -> String {
        let (host_and_port, context) = match node_name.as_str().split_once('_') {
            Some((host, context)) => (host, percent_decode(context)),
            None => (node_name.as_str(), String::new()),
        };

        if context.is_empty() {
            format!("{url_scheme}://{host_and_port}")
        } else {
            format!("{url_scheme}://{host_and_port}/{context}")
        }
    }
}

/// Decodes `%XX` escapes. Malformed escapes are kept verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = char::from(bytes[i + 1]).to_digit(16);
            let lo = char::from(bytes[i + 2]).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::{Replica, Slice, SliceState};
    use test_case::test_case;

    fn collection_with(names: &[&str]) -> Collection {
        let slice = names.iter().fold(
            Slice::new("shard1", "films", SliceState::Active),
            |slice, name| {
                slice.with_replica(Replica::new(*name, "films", "shard1", "n1", "http://n1", "c"))
            },
        );
        Collection::new("films").with_slice(slice)
    }

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let a = clock.epoch_now();
        let b = clock.epoch_now();
        let c = clock.epoch_now();
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn fixed_clock_reads_constant() {
        let clock = FixedClock::at_nanos(99);
        assert_eq!(clock.epoch_now(), clock.epoch_now());
        assert_eq!(clock.epoch_now().as_nanos(), 99);
    }

    #[test]
    fn first_assigned_name_is_one() {
        let names = SequentialCoreNodeNames::default();
        assert_eq!(
            names.assign(&Collection::new("films")).as_str(),
            "core_node1"
        );
    }

    #[test]
    fn assigned_name_skips_past_highest_suffix() {
        let names = SequentialCoreNodeNames::default();
        let collection = collection_with(&["core_node2", "core_node9", "custom"]);
        assert_eq!(names.assign(&collection).as_str(), "core_node10");
    }

    #[test]
    fn assigned_name_never_collides_with_foreign_names() {
        let names = SequentialCoreNodeNames::new("r");
        let collection = collection_with(&["a", "b", "r4"]);
        let assigned = names.assign(&collection);
        assert_eq!(assigned.as_str(), "r5");
        assert!(collection.replica(assigned.as_str()).is_none());
    }

    #[test]
    fn assigned_name_survives_maximal_suffix() {
        let names = SequentialCoreNodeNames::default();
        let collection = collection_with(&["core_node18446744073709551615"]);
        assert_eq!(names.assign(&collection).as_str(), "core_node0");
    }

    #[test_case("10.0.0.1:8983_solr", "http", "http://10.0.0.1:8983/solr"; "with context")]
    #[test_case("10.0.0.1:8983_", "https", "https://10.0.0.1:8983"; "empty context")]
    #[test_case("10.0.0.1:8983", "http", "http://10.0.0.1:8983"; "no separator")]
    #[test_case("host:1_solr%2Fv2", "http", "http://host:1/solr/v2"; "encoded context")]
    #[test_case("host:1_a%zzb", "http", "http://host:1/a%zzb"; "malformed escape kept")]
    fn resolves_base_url(node: &str, scheme: &str, expected: &str) {
        assert_eq!(
            NodeNameUrlResolver.base_url(&NodeName::new(node), scheme),
            expected
        );
    }
}
