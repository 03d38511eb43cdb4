//! Replica-level transitions.
//!
//! Every function takes a replica by value and returns the changed copy.
//! They are total: none of them can fail.

use cairn_types::{PROPERTY_PREFIX, Replica};

/// Returns the replica with its leader flag set.
pub fn set_leader(replica: Replica) -> Replica {
    replica.with_leader(true)
}

/// Returns the replica with its leader flag cleared.
pub fn unset_leader(replica: Replica) -> Replica {
    replica.with_leader(false)
}

/// Returns the replica with `key` set to `value`.
///
/// `key` is normalized with [`normalize_property_key`] first.
pub fn add_property(replica: Replica, key: &str, value: &str) -> Replica {
    replica.with_property(normalize_property_key(key), value)
}

/// Returns the replica without `key`.
pub fn delete_property(replica: Replica, key: &str) -> Replica {
    replica.without_property(&normalize_property_key(key))
}

/// Lowercases a property name and adds the custom-property prefix if it is
/// missing, so `preferredLeader` and `property.preferredleader` name the
/// same property.
pub fn normalize_property_key(key: &str) -> String {
    let key = key.to_lowercase();
    if key.starts_with(PROPERTY_PREFIX) {
        key
    } else {
        format!("{PROPERTY_PREFIX}{key}")
    }
}
