//! # cairn-types: Topology model for `cairn`
//!
//! This crate contains the immutable value types that describe cluster
//! topology, shared by every other `cairn` crate:
//! - Identity names ([`CollectionName`], [`ShardName`], [`CoreNodeName`], [`NodeName`])
//! - Lifecycle states ([`SliceState`], [`ReplicaState`], [`ReplicaType`])
//! - Temporal types ([`Timestamp`])
//! - Digests ([`struct@Hash`])
//! - Topology values ([`Replica`], [`Slice`], [`Collection`], [`RoutingRule`])
//!
//! Values are never mutated after they are shared. Every "update" is a
//! `with_*` / `without_*` method that takes `self` by value and returns the
//! changed copy, so callers clone exactly the node on the path they rewrite.
//! [`Collection`] holds its slices behind [`Arc`], which lets a rewrite of
//! one slice reuse every other slice untouched.

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Prefix under which admin-supplied replica properties travel.
pub const PROPERTY_PREFIX: &str = "property.";

/// Replica property that may be set on at most one replica per slice.
pub const PREFERRED_LEADER_PROP: &str = "property.preferredleader";

/// Boolean replica properties that are always unique within a slice.
pub const SLICE_UNIQUE_BOOLEAN_PROPERTIES: &[&str] = &[PREFERRED_LEADER_PROP];

// ============================================================================
// Identity Names - Clone (heap-backed strings)
// ============================================================================

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_type!(
    /// Name of a collection (a shard-partitioned logical dataset).
    CollectionName
);

name_type!(
    /// Name of a shard within a collection, e.g. `shard1`.
    ShardName
);

name_type!(
    /// Globally unique replica identity, e.g. `core_node7`.
    ///
    /// Assigned once when the replica is created and never changed.
    CoreNodeName
);

name_type!(
    /// Name of a live node, in `host:port_context` form.
    NodeName
);

// ============================================================================
// Lifecycle States - Copy (simple enums, no heap data)
// ============================================================================

/// Error returned when a lifecycle string does not name a known variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle state of a shard.
///
/// Split children start in `Construction` or `Recovery`; reaching `Active`
/// finalizes the split and clears the lineage fields for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceState {
    Construction,
    Recovery,
    RecoveryFailed,
    Active,
    Inactive,
}

impl SliceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Construction => "construction",
            Self::Recovery => "recovery",
            Self::RecoveryFailed => "recovery_failed",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl Display for SliceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SliceState {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "construction" => Ok(Self::Construction),
            "recovery" => Ok(Self::Recovery),
            "recovery_failed" => Ok(Self::RecoveryFailed),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(UnknownVariant {
                kind: "shard state",
                value: value.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a single replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaState {
    Active,
    Down,
    Recovering,
    RecoveryFailed,
}

impl ReplicaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Down => "down",
            Self::Recovering => "recovering",
            Self::RecoveryFailed => "recovery_failed",
        }
    }
}

impl Display for ReplicaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicaState {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "down" => Ok(Self::Down),
            "recovering" => Ok(Self::Recovering),
            "recovery_failed" => Ok(Self::RecoveryFailed),
            _ => Err(UnknownVariant {
                kind: "replica state",
                value: value.to_string(),
            }),
        }
    }
}

/// Replication role of a replica.
///
/// Leader eligibility per type is enforced outside the topology model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicaType {
    /// Near-real-time: indexes locally, may lead.
    #[default]
    Nrt,
    /// Transaction-log only, may lead.
    Tlog,
    /// Pulls index segments from the leader, never leads.
    Pull,
}

impl ReplicaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nrt => "NRT",
            Self::Tlog => "TLOG",
            Self::Pull => "PULL",
        }
    }
}

impl Display for ReplicaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicaType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NRT" => Ok(Self::Nrt),
            "TLOG" => Ok(Self::Tlog),
            "PULL" => Ok(Self::Pull),
            _ => Err(UnknownVariant {
                kind: "replica type",
                value: value.to_string(),
            }),
        }
    }
}

// ============================================================================
// Cryptographic Hash - Copy (fixed 32-byte value)
// ============================================================================

/// Length of topology digests in bytes (BLAKE3).
pub const HASH_LENGTH: usize = 32;

/// A 32-byte digest of a topology snapshot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Hash({:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Timestamp - Copy (8-byte value with monotonic guarantee)
// ============================================================================

/// Epoch-based timestamp.
///
/// Stored as nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC) rather
/// than a process-local monotonic reading, so values written by one
/// control-plane leader stay comparable after another takes over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp as seconds since Unix epoch (truncates nanoseconds).
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Creates a timestamp for the current time.
    ///
    /// A system clock set before the epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self(nanos)
    }

    /// Creates a timestamp ensuring monotonicity: `max(now, last + 1ns)`.
    pub fn now_monotonic(last: Option<Timestamp>) -> Self {
        let now = Self::now();
        match last {
            Some(prev) if now.0 <= prev.0 => Timestamp(prev.0.saturating_add(1)),
            _ => now,
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Timestamp {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for Timestamp {
    fn from(nanos: u64) -> Self {
        Self(nanos)
    }
}

// ============================================================================
// Replica - Clone (leaf topology value)
// ============================================================================

/// One physical serving copy of a shard, hosted on one node.
///
/// `collection` and `shard` are back-references by name; the replica never
/// owns its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub name: CoreNodeName,
    pub collection: CollectionName,
    pub shard: ShardName,
    pub node_name: NodeName,
    pub base_url: String,
    pub core_name: String,
    pub state: ReplicaState,
    pub replica_type: ReplicaType,
    #[serde(default)]
    pub leader: bool,
    #[serde(default)]
    pub force_set_state: bool,
    /// Admin-supplied properties, keyed with [`PROPERTY_PREFIX`].
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Replica {
    /// Creates a non-leader NRT replica in the `Down` state.
    pub fn new(
        name: impl Into<CoreNodeName>,
        collection: impl Into<CollectionName>,
        shard: impl Into<ShardName>,
        node_name: impl Into<NodeName>,
        base_url: impl Into<String>,
        core_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            shard: shard.into(),
            node_name: node_name.into(),
            base_url: base_url.into(),
            core_name: core_name.into(),
            state: ReplicaState::Down,
            replica_type: ReplicaType::Nrt,
            leader: false,
            force_set_state: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_state(mut self, state: ReplicaState) -> Self {
        self.state = state;
        self
    }

    pub fn with_type(mut self, replica_type: ReplicaType) -> Self {
        self.replica_type = replica_type;
        self
    }

    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn without_property(mut self, key: &str) -> Self {
        self.properties.remove(key);
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Canonical URL of this replica's core: `base_url/core_name/`.
    pub fn core_url(&self) -> String {
        core_url(&self.base_url, &self.core_name)
    }
}

/// Joins a base URL and a core name into a canonical core URL.
///
/// The result always has exactly one `/` between the parts and ends with
/// `/`, so URLs built from messages and from replicas compare equal.
pub fn core_url(base_url: &str, core_name: &str) -> String {
    let mut url = String::with_capacity(base_url.len() + core_name.len() + 2);
    url.push_str(base_url);
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(core_name);
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

// ============================================================================
// Routing Rule - Clone
// ============================================================================

/// Temporary redirect of a route key to a target collection, installed on a
/// parent shard while documents migrate during a split or migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    route_key: String,
    target_collection: CollectionName,
    route_ranges: Vec<String>,
    expire_at: Timestamp,
}

impl RoutingRule {
    pub fn new(
        route_key: impl Into<String>,
        range: impl Into<String>,
        target_collection: impl Into<CollectionName>,
        expire_at: Timestamp,
    ) -> Self {
        Self {
            route_key: route_key.into(),
            target_collection: target_collection.into(),
            route_ranges: vec![range.into()],
            expire_at,
        }
    }

    /// Appends another hash range and moves the expiry to `expire_at`.
    ///
    /// The target collection is left as it was first recorded.
    pub fn with_range(mut self, range: impl Into<String>, expire_at: Timestamp) -> Self {
        self.route_ranges.push(range.into());
        self.expire_at = expire_at;
        self
    }

    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    pub fn target_collection(&self) -> &CollectionName {
        &self.target_collection
    }

    pub fn ranges(&self) -> &[String] {
        &self.route_ranges
    }

    /// The accumulated ranges in wire form, comma-joined in insertion order.
    pub fn route_ranges(&self) -> String {
        self.route_ranges.join(",")
    }

    pub fn expire_at(&self) -> Timestamp {
        self.expire_at
    }
}

// ============================================================================
// Slice - Clone (shard: replicas plus lifecycle properties)
// ============================================================================

/// Routing rules of a slice, keyed by route key.
pub type RoutingRules = BTreeMap<String, RoutingRule>;

/// One shard of a collection.
///
/// At most one replica in `replicas` has its leader flag set. The slice's
/// `collection` always names the collection that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    name: ShardName,
    collection: CollectionName,
    replicas: BTreeMap<CoreNodeName, Replica>,
    state: SliceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<ShardName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shard_parent_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shard_parent_zk_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    routing_rules: Option<RoutingRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state_timestamp: Option<Timestamp>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl Slice {
    /// Creates an empty slice in the given state.
    pub fn new(
        name: impl Into<ShardName>,
        collection: impl Into<CollectionName>,
        state: SliceState,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            replicas: BTreeMap::new(),
            state,
            range: None,
            parent: None,
            shard_parent_node: None,
            shard_parent_zk_session: None,
            routing_rules: None,
            state_timestamp: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &ShardName {
        &self.name
    }

    /// Name of the collection this slice belongs to.
    pub fn collection(&self) -> &CollectionName {
        &self.collection
    }

    pub fn replicas(&self) -> &BTreeMap<CoreNodeName, Replica> {
        &self.replicas
    }

    pub fn replica(&self, name: &str) -> Option<&Replica> {
        self.replicas.get(name)
    }

    /// Returns the first replica flagged as leader, if any.
    pub fn leader(&self) -> Option<&Replica> {
        self.replicas.values().find(|r| r.leader)
    }

    /// Number of replicas flagged as leader. Never more than one for a
    /// well-formed slice.
    pub fn leader_count(&self) -> usize {
        self.replicas.values().filter(|r| r.leader).count()
    }

    pub fn state(&self) -> SliceState {
        self.state
    }

    pub fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }

    pub fn parent(&self) -> Option<&ShardName> {
        self.parent.as_ref()
    }

    pub fn shard_parent_node(&self) -> Option<&str> {
        self.shard_parent_node.as_deref()
    }

    pub fn shard_parent_zk_session(&self) -> Option<&str> {
        self.shard_parent_zk_session.as_deref()
    }

    /// True if any split-lineage field is present.
    pub fn has_lineage(&self) -> bool {
        self.parent.is_some()
            || self.shard_parent_node.is_some()
            || self.shard_parent_zk_session.is_some()
    }

    pub fn routing_rules(&self) -> Option<&RoutingRules> {
        self.routing_rules.as_ref()
    }

    pub fn state_timestamp(&self) -> Option<Timestamp> {
        self.state_timestamp
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Replaces the whole replica mapping.
    pub fn with_replicas(mut self, replicas: BTreeMap<CoreNodeName, Replica>) -> Self {
        self.replicas = replicas;
        self
    }

    /// Inserts a replica, overwriting any replica with the same name.
    pub fn with_replica(mut self, replica: Replica) -> Self {
        self.replicas.insert(replica.name.clone(), replica);
        self
    }

    /// Removes a replica by name. Absent names leave the slice unchanged.
    pub fn without_replica(mut self, name: &str) -> Self {
        self.replicas.remove(name);
        self
    }

    /// Sets the lifecycle state and stamps when it changed.
    pub fn with_state(mut self, state: SliceState, changed_at: Timestamp) -> Self {
        self.state = state;
        self.state_timestamp = Some(changed_at);
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Records the split lineage of a child shard.
    pub fn with_lineage(
        mut self,
        parent: impl Into<ShardName>,
        parent_node: impl Into<String>,
        parent_session: impl Into<String>,
    ) -> Self {
        self.parent = Some(parent.into());
        self.shard_parent_node = Some(parent_node.into());
        self.shard_parent_zk_session = Some(parent_session.into());
        self
    }

    /// Drops every split-lineage field.
    pub fn without_lineage(mut self) -> Self {
        self.parent = None;
        self.shard_parent_node = None;
        self.shard_parent_zk_session = None;
        self
    }

    pub fn with_routing_rules(mut self, rules: Option<RoutingRules>) -> Self {
        self.routing_rules = rules;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Collection - Clone (slices shared through Arc)
// ============================================================================

/// Collection-level property that switches leader/state bookkeeping to
/// per-replica state entries.
pub const PER_REPLICA_STATE_PROP: &str = "perReplicaState";

/// A named, shard-partitioned dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    name: CollectionName,
    slices: BTreeMap<ShardName, Arc<Slice>>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    /// Version of the persisted record this snapshot was read from. Owned by
    /// the persistence layer and carried through rewrites untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    znode_version: Option<u64>,
}

impl Collection {
    pub fn new(name: impl Into<CollectionName>) -> Self {
        Self {
            name: name.into(),
            slices: BTreeMap::new(),
            properties: BTreeMap::new(),
            znode_version: None,
        }
    }

    pub fn name(&self) -> &CollectionName {
        &self.name
    }

    pub fn slices(&self) -> &BTreeMap<ShardName, Arc<Slice>> {
        &self.slices
    }

    pub fn slice(&self, name: &str) -> Option<&Arc<Slice>> {
        self.slices.get(name)
    }

    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    /// Finds a replica by name in any slice.
    pub fn replica(&self, name: &str) -> Option<&Replica> {
        self.slices.values().find_map(|s| s.replica(name))
    }

    /// Iterates every replica of every slice, in shard then replica order.
    pub fn replicas(&self) -> impl Iterator<Item = &Replica> {
        self.slices.values().flat_map(|s| s.replicas().values())
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// True if leadership and replica state are tracked per replica.
    pub fn is_per_replica_state(&self) -> bool {
        self.property(PER_REPLICA_STATE_PROP)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn znode_version(&self) -> Option<u64> {
        self.znode_version
    }

    /// Inserts or replaces a slice, keyed by its name.
    pub fn with_slice(mut self, slice: impl Into<Arc<Slice>>) -> Self {
        let slice = slice.into();
        self.slices.insert(slice.name().clone(), slice);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_per_replica_state(self, enabled: bool) -> Self {
        self.with_property(PER_REPLICA_STATE_PROP, enabled.to_string())
    }

    pub fn with_znode_version(mut self, version: u64) -> Self {
        self.znode_version = Some(version);
        self
    }

    /// Returns a copy holding `slices` in place of the current mapping.
    ///
    /// Name, properties and version are carried over unchanged.
    pub fn copy_with_slices(&self, slices: BTreeMap<ShardName, Arc<Slice>>) -> Self {
        Self {
            name: self.name.clone(),
            slices,
            properties: self.properties.clone(),
            znode_version: self.znode_version,
        }
    }
}
