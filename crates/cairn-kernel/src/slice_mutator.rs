//! Shard-scoped topology operations.
//!
//! Each operation reads one [`ClusterState`] snapshot plus a decoded
//! command and returns exactly one [`WriteCommand`]. Nothing here mutates
//! its inputs: new slices are built by value and spliced back into the
//! collection through [`update_slice`].
//!
//! Two failure classes exist:
//! - A command that names a collection, slice, or replica that is missing
//!   from the snapshot is logged and answered with `NoOp`. These are
//!   expected races between the admin layer and the live topology.
//! - Shard state updates and routing rule additions that name an unknown
//!   shard fail with [`KernelError::InvariantViolation`], because their
//!   callers validate shard names before sending.

use std::collections::BTreeMap;
use std::sync::Arc;

use cairn_types::{Collection, CoreNodeName, Replica, RoutingRule, Slice, SliceState};
use tracing::{debug, error, info, warn};

use crate::collection_mutator::update_slice;
use crate::command::{
    AddReplica, AddReplicaProperty, AddRoutingRule, DeleteReplicaProperty, Operation,
    RemoveReplica, RemoveRoutingRule, SetShardLeader, UpdateShardState,
};
use crate::effects::WriteCommand;
use crate::kernel::KernelError;
use crate::replica_mutator;
use crate::state::ClusterState;
use crate::traits::{BaseUrlResolver, Clock, CoreNodeNameAssigner};

/// URL scheme used when none is configured.
pub const DEFAULT_URL_SCHEME: &str = "http";

/// Applies shard-scoped operations using injected collaborators.
///
/// Generic over the clock, naming policy, and URL resolver so production
/// and tests can plug in their own.
#[derive(Debug, Clone)]
pub struct SliceMutator<C, A, R> {
    clock: C,
    names: A,
    resolver: R,
    url_scheme: String,
}

impl<C, A, R> SliceMutator<C, A, R>
where
    C: Clock,
    A: CoreNodeNameAssigner,
    R: BaseUrlResolver,
{
    /// Creates a mutator that resolves base URLs with the `http` scheme.
    pub fn new(clock: C, names: A, resolver: R) -> Self {
        Self {
            clock,
            names,
            resolver,
            url_scheme: DEFAULT_URL_SCHEME.to_string(),
        }
    }

    /// Sets the cluster-wide URL scheme handed to the resolver.
    pub fn with_url_scheme(mut self, url_scheme: impl Into<String>) -> Self {
        self.url_scheme = url_scheme.into();
        self
    }

    pub fn url_scheme(&self) -> &str {
        &self.url_scheme
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ========================================================================
    // Replica membership
    // ========================================================================

    /// Adds a replica to a shard, or overwrites the replica with the same
    /// core node name.
    pub fn add_replica(
        &self,
        state: &ClusterState,
        cmd: &AddReplica,
    ) -> Result<WriteCommand, KernelError> {
        info!(collection = %cmd.collection, shard = %cmd.shard, node = %cmd.node_name, "add replica");

        let Some((collection, slice)) = lookup(state, cmd.collection.as_str(), cmd.shard.as_str())
        else {
            error!(collection = %cmd.collection, shard = %cmd.shard, "invalid collection/slice");
            return Ok(WriteCommand::NoOp);
        };

        let core_node_name = cmd
            .core_node_name
            .clone()
            .unwrap_or_else(|| self.names.assign(collection));
        let base_url = self.resolver.base_url(&cmd.node_name, &self.url_scheme);

        let mut replica = Replica::new(
            core_node_name.clone(),
            cmd.collection.clone(),
            cmd.shard.clone(),
            cmd.node_name.clone(),
            base_url,
            cmd.core_name.clone(),
        )
        .with_state(cmd.state)
        .with_type(cmd.replica_type);
        replica.properties.extend(cmd.properties.clone());

        let updated = update_replica(collection, slice, &core_node_name, Some(replica))?;
        Ok(WriteCommand::replace(updated))
    }

    /// Removes a replica from every slice that holds it.
    ///
    /// When the collection is already gone, answers `Delete` so any record
    /// left behind for it is purged.
    pub fn remove_replica(
        &self,
        state: &ClusterState,
        cmd: &RemoveReplica,
    ) -> Result<WriteCommand, KernelError> {
        info!(collection = %cmd.collection, core_node = ?cmd.core_node_name, "remove replica");

        let Some(collection) = state.get_collection(cmd.collection.as_str()) else {
            info!(collection = %cmd.collection, "collection is gone, deleting its record");
            return Ok(WriteCommand::delete(cmd.collection.clone()));
        };
        let Some(target) = cmd.core_node_name.as_ref().map(CoreNodeName::as_str) else {
            warn!(collection = %cmd.collection, "no core node name to remove");
            return Ok(WriteCommand::replace((**collection).clone()));
        };

        let slices = collection
            .slices()
            .iter()
            .map(|(name, slice)| {
                let hosted_here = slice.replica(target).is_some_and(|replica| {
                    cmd.node_name
                        .as_ref()
                        .is_none_or(|node| *node == replica.node_name)
                });
                let slice = if hosted_here {
                    Arc::new((**slice).clone().without_replica(target))
                } else {
                    Arc::clone(slice)
                };
                (name.clone(), slice)
            })
            .collect();

        Ok(WriteCommand::replace(collection.copy_with_slices(slices)))
    }

    // ========================================================================
    // Leadership
    // ========================================================================

    /// Promotes the replica whose core URL matches the requested leader and
    /// demotes every other replica flagged as leader.
    ///
    /// When several replicas share the requested URL, only the first in
    /// core node name order is promoted.
    pub fn set_shard_leader(
        &self,
        state: &ClusterState,
        cmd: &SetShardLeader,
    ) -> Result<WriteCommand, KernelError> {
        info!(collection = %cmd.collection, shard = %cmd.shard, base_url = ?cmd.base_url, "set shard leader");

        let Some(collection) = state.get_collection(cmd.collection.as_str()) else {
            error!(collection = %cmd.collection, "could not mark shard leader for non existing collection");
            return Ok(WriteCommand::NoOp);
        };
        if collection.is_per_replica_state() {
            debug!(collection = %cmd.collection, "not marking shard leader for per-replica-state collection");
            return Ok(WriteCommand::NoOp);
        }
        let Some(slice) = collection.slice(cmd.shard.as_str()) else {
            error!(collection = %cmd.collection, shard = %cmd.shard, "could not mark leader for non existing shard");
            return Ok(WriteCommand::NoOp);
        };

        let leader_url = cmd.leader_url();
        let mut new_leader: Option<&CoreNodeName> = None;
        let mut url_matches = 0usize;

        let replicas: BTreeMap<CoreNodeName, Replica> = slice
            .replicas()
            .iter()
            .map(|(name, replica)| {
                let is_requested = leader_url
                    .as_deref()
                    .is_some_and(|url| url == replica.core_url());
                if is_requested {
                    url_matches += 1;
                }

                let replica = if is_requested && new_leader.is_none() {
                    new_leader = Some(name);
                    replica_mutator::set_leader(replica.clone())
                } else if replica.leader {
                    replica_mutator::unset_leader(replica.clone())
                } else {
                    replica.clone()
                };
                (name.clone(), replica)
            })
            .collect();

        if url_matches > 1 {
            warn!(
                collection = %cmd.collection,
                shard = %cmd.shard,
                url_matches,
                promoted = ?new_leader,
                "several replicas share the requested leader url, promoting the first"
            );
        }

        let new_slice = (**slice).clone().with_replicas(replicas);

        // Postcondition: at most one leader, and it is the requested replica
        assert!(
            new_slice.leader_count() <= 1,
            "slice {} has {} leaders after leader election",
            new_slice.name(),
            new_slice.leader_count()
        );
        debug_assert_eq!(
            new_slice.leader().map(|r| &r.name),
            new_leader,
            "promoted replica must be the only leader"
        );

        let updated = update_slice(&cmd.collection, collection, new_slice)?;
        Ok(WriteCommand::replace(updated))
    }

    // ========================================================================
    // Shard lifecycle
    // ========================================================================

    /// Applies a batch of shard state changes in one rewrite.
    ///
    /// A shard moving to `Active` loses its split lineage for good.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvariantViolation`] if any named shard does
    /// not exist in the collection, and [`KernelError::Decode`] if a
    /// requested state does not parse. No write is produced in either case.
    pub fn update_shard_state(
        &self,
        state: &ClusterState,
        cmd: &UpdateShardState,
    ) -> Result<WriteCommand, KernelError> {
        let Some(collection) = state.get_collection(cmd.collection.as_str()) else {
            error!(collection = %cmd.collection, "update shard state for non existing collection");
            return Ok(WriteCommand::NoOp);
        };
        info!(collection = %cmd.collection, shards = cmd.states.len(), "update shard state");

        // Every shard must exist before any state value is looked at
        let targets = cmd
            .states
            .iter()
            .map(|(shard, value)| {
                collection
                    .slice(shard.as_str())
                    .map(|slice| (shard, value, slice))
                    .ok_or_else(|| KernelError::InvariantViolation {
                        operation: Some(Operation::UpdateShardState),
                        collection: cmd.collection.clone(),
                        detail: format!("unknown slice '{shard}'"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut slices = collection.slices().clone();
        for (shard, value, slice) in targets {
            let new_state = UpdateShardState::parse_state(shard, value)?;
            info!(shard = %shard, from = %slice.state(), to = %new_state, "update shard state");

            let mut updated = (**slice).clone();
            if new_state == SliceState::Active {
                updated = updated.without_lineage();
            }
            let updated = updated.with_state(new_state, self.clock.epoch_now());
            slices.insert(shard.clone(), Arc::new(updated));
        }

        Ok(WriteCommand::replace(collection.copy_with_slices(slices)))
    }

    // ========================================================================
    // Routing rules
    // ========================================================================

    /// Installs a routing rule on a shard, or appends a range to the
    /// existing rule with the same route key.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvariantViolation`] if the shard does not
    /// exist in the collection.
    pub fn add_routing_rule(
        &self,
        state: &ClusterState,
        cmd: &AddRoutingRule,
    ) -> Result<WriteCommand, KernelError> {
        let Some(collection) = state.get_collection(cmd.collection.as_str()) else {
            error!(collection = %cmd.collection, "add routing rule for non existing collection");
            return Ok(WriteCommand::NoOp);
        };
        let Some(slice) = collection.slice(cmd.shard.as_str()) else {
            return Err(KernelError::InvariantViolation {
                operation: Some(Operation::AddRoutingRule),
                collection: cmd.collection.clone(),
                detail: format!("unknown slice '{}'", cmd.shard),
            });
        };

        let mut rules = slice.routing_rules().cloned().unwrap_or_default();
        let rule = match rules.remove(&cmd.route_key) {
            None => RoutingRule::new(
                cmd.route_key.clone(),
                cmd.range.clone(),
                cmd.target_collection.clone(),
                cmd.expire_at,
            ),
            Some(existing) => existing.with_range(cmd.range.clone(), cmd.expire_at),
        };
        debug!(route_key = %cmd.route_key, ranges = %rule.route_ranges(), "routing rule");
        rules.insert(cmd.route_key.clone(), rule);

        let new_slice = (**slice).clone().with_routing_rules(Some(rules));
        let updated = update_slice(&cmd.collection, collection, new_slice)?;
        Ok(WriteCommand::replace(updated))
    }

    /// Drops the routing rule for a route key.
    ///
    /// An emptied rule table is kept as an empty table rather than removed.
    pub fn remove_routing_rule(
        &self,
        state: &ClusterState,
        cmd: &RemoveRoutingRule,
    ) -> Result<WriteCommand, KernelError> {
        info!(collection = %cmd.collection, shard = %cmd.shard, route_key = %cmd.route_key, "remove routing rule");

        let Some((collection, slice)) = lookup(state, cmd.collection.as_str(), cmd.shard.as_str())
        else {
            warn!(collection = %cmd.collection, shard = %cmd.shard, "unknown collection/shard");
            return Ok(WriteCommand::NoOp);
        };
        let Some(rules) = slice.routing_rules() else {
            return Ok(WriteCommand::NoOp);
        };

        let mut rules = rules.clone();
        rules.remove(&cmd.route_key);

        let new_slice = (**slice).clone().with_routing_rules(Some(rules));
        let updated = update_slice(&cmd.collection, collection, new_slice)?;
        Ok(WriteCommand::replace(updated))
    }

    // ========================================================================
    // Replica properties
    // ========================================================================

    /// Sets a custom property on one replica.
    ///
    /// For slice-unique properties the property is also cleared from every
    /// other replica of the slice.
    pub fn add_replica_property(
        &self,
        state: &ClusterState,
        cmd: &AddReplicaProperty,
    ) -> Result<WriteCommand, KernelError> {
        let Some((collection, slice)) = lookup(state, cmd.collection.as_str(), cmd.shard.as_str())
        else {
            warn!(collection = %cmd.collection, shard = %cmd.shard, "unknown collection/shard");
            return Ok(WriteCommand::NoOp);
        };
        if slice.replica(cmd.core_node_name.as_str()).is_none() {
            warn!(collection = %cmd.collection, shard = %cmd.shard, replica = %cmd.core_node_name, "unknown replica");
            return Ok(WriteCommand::NoOp);
        }

        let replicas: BTreeMap<CoreNodeName, Replica> = slice
            .replicas()
            .iter()
            .map(|(name, replica)| {
                let replica = if *name == cmd.core_node_name {
                    replica_mutator::add_property(replica.clone(), &cmd.property, &cmd.value)
                } else if cmd.shard_unique && replica.property(&cmd.property).is_some() {
                    replica_mutator::delete_property(replica.clone(), &cmd.property)
                } else {
                    replica.clone()
                };
                (name.clone(), replica)
            })
            .collect();

        if replicas == *slice.replicas() {
            debug!(replica = %cmd.core_node_name, property = %cmd.property, "property already set");
            return Ok(WriteCommand::NoOp);
        }

        let new_slice = (**slice).clone().with_replicas(replicas);
        let updated = update_slice(&cmd.collection, collection, new_slice)?;
        Ok(WriteCommand::replace(updated))
    }

    /// Removes a custom property from one replica.
    pub fn delete_replica_property(
        &self,
        state: &ClusterState,
        cmd: &DeleteReplicaProperty,
    ) -> Result<WriteCommand, KernelError> {
        let Some((collection, slice)) = lookup(state, cmd.collection.as_str(), cmd.shard.as_str())
        else {
            warn!(collection = %cmd.collection, shard = %cmd.shard, "unknown collection/shard");
            return Ok(WriteCommand::NoOp);
        };
        let Some(replica) = slice.replica(cmd.core_node_name.as_str()) else {
            warn!(collection = %cmd.collection, shard = %cmd.shard, replica = %cmd.core_node_name, "unknown replica");
            return Ok(WriteCommand::NoOp);
        };
        if replica.property(&cmd.property).is_none() {
            return Ok(WriteCommand::NoOp);
        }

        let replica = replica_mutator::delete_property(replica.clone(), &cmd.property);
        let updated = update_replica(collection, slice, &cmd.core_node_name, Some(replica))?;
        Ok(WriteCommand::replace(updated))
    }
}

/// Inserts (`Some`) or removes (`None`) one replica of `slice` and splices
/// the rebuilt slice back into `collection`.
///
/// # Errors
///
/// Returns [`KernelError::InvariantViolation`] if `slice` does not belong
/// to `collection`.
pub fn update_replica(
    collection: &Collection,
    slice: &Slice,
    core_node_name: &CoreNodeName,
    replica: Option<Replica>,
) -> Result<Collection, KernelError> {
    let new_slice = match replica {
        Some(replica) => {
            debug_assert_eq!(&replica.name, core_node_name);
            slice.clone().with_replica(replica)
        }
        None => slice.clone().without_replica(core_node_name.as_str()),
    };
    debug!(old = ?slice, "old slice");
    debug!(new = ?new_slice, "new slice");
    update_slice(collection.name(), collection, new_slice)
}

/// Looks up a collection and one of its slices.
fn lookup<'a>(
    state: &'a ClusterState,
    collection: &str,
    shard: &str,
) -> Option<(&'a Collection, &'a Arc<Slice>)> {
    let collection = state.get_collection(collection)?;
    let slice = collection.slice(shard)?;
    Some((&**collection, slice))
}
