//! Inbound messages and the typed commands decoded from them.
//!
//! The admin layer hands the kernel a flat string-keyed [`Message`]. The
//! kernel decodes it once, at the boundary, into a [`Command`] so the
//! mutators never probe for missing keys themselves.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use cairn_types::{
    CollectionName, CoreNodeName, NodeName, PROPERTY_PREFIX, ReplicaState, ReplicaType,
    SLICE_UNIQUE_BOOLEAN_PROPERTIES, ShardName, SliceState, Timestamp, core_url,
};
use serde::{Deserialize, Serialize};

use crate::replica_mutator::normalize_property_key;

/// Recognized message keys.
pub mod keys {
    pub const OPERATION: &str = "operation";
    pub const COLLECTION: &str = "collection";
    pub const SHARD: &str = "shard";
    pub const CORE_NODE_NAME: &str = "core_node_name";
    pub const NODE_NAME: &str = "node_name";
    pub const CORE_NAME: &str = "core_name";
    pub const STATE: &str = "state";
    pub const BASE_URL: &str = "base_url";
    pub const REPLICA_TYPE: &str = "replica_type";
    pub const ROUTE_KEY: &str = "route_key";
    pub const RANGE: &str = "range";
    pub const TARGET_COLLECTION: &str = "target_collection";
    pub const EXPIRE_AT: &str = "expire_at";
    pub const PROPERTY: &str = "property";
    pub const PROPERTY_VALUE: &str = "property_value";
    pub const SHARD_UNIQUE: &str = "shard_unique";
}

// ============================================================================
// Message
// ============================================================================

/// Unordered string key/value map produced by the admin layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(BTreeMap<String, String>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message carrying only an operation marker.
    pub fn for_operation(operation: Operation) -> Self {
        Self::new().with(keys::OPERATION, operation.as_str())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The collection key, if present and non-empty.
    pub fn collection(&self) -> Option<&str> {
        self.non_empty(keys::COLLECTION)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<&str, DecodeError> {
        self.non_empty(key).ok_or(DecodeError::MissingField(key))
    }

    fn parsed<T>(&self, key: &'static str) -> Result<Option<T>, DecodeError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.non_empty(key)
            .map(|value| {
                value.parse::<T>().map_err(|e| DecodeError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Message {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ============================================================================
// Operation
// ============================================================================

/// Operation-type marker carried under [`keys::OPERATION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    AddReplica,
    RemoveReplica,
    Leader,
    UpdateShardState,
    AddRoutingRule,
    RemoveRoutingRule,
    AddReplicaProp,
    DeleteReplicaProp,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddReplica => "addreplica",
            Self::RemoveReplica => "removereplica",
            Self::Leader => "leader",
            Self::UpdateShardState => "updateshardstate",
            Self::AddRoutingRule => "addroutingrule",
            Self::RemoveRoutingRule => "removeroutingrule",
            Self::AddReplicaProp => "addreplicaprop",
            Self::DeleteReplicaProp => "deletereplicaprop",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "addreplica" => Ok(Self::AddReplica),
            "removereplica" => Ok(Self::RemoveReplica),
            "leader" => Ok(Self::Leader),
            "updateshardstate" => Ok(Self::UpdateShardState),
            "addroutingrule" => Ok(Self::AddRoutingRule),
            "removeroutingrule" => Ok(Self::RemoveRoutingRule),
            "addreplicaprop" => Ok(Self::AddReplicaProp),
            "deletereplicaprop" => Ok(Self::DeleteReplicaProp),
            _ => Err(DecodeError::UnknownOperation(value.to_string())),
        }
    }
}

// ============================================================================
// Command payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReplica {
    pub collection: CollectionName,
    pub shard: ShardName,
    /// Assigned by the naming policy when absent.
    pub core_node_name: Option<CoreNodeName>,
    pub node_name: NodeName,
    pub core_name: String,
    pub state: ReplicaState,
    pub replica_type: ReplicaType,
    /// Custom properties, keys already carrying the property prefix.
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveReplica {
    pub collection: CollectionName,
    /// When absent, an existing collection is rewritten unchanged.
    pub core_node_name: Option<CoreNodeName>,
    /// When set, only a replica hosted on this node is removed.
    pub node_name: Option<NodeName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetShardLeader {
    pub collection: CollectionName,
    pub shard: ShardName,
    pub base_url: Option<String>,
    pub core_name: Option<String>,
}

impl SetShardLeader {
    /// Core URL of the requested leader. `None` when no base URL was sent,
    /// meaning no replica should hold leadership.
    pub fn leader_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(|base| core_url(base, self.core_name.as_deref().unwrap_or_default()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShardState {
    pub collection: CollectionName,
    /// Requested state per shard, as sent. Values are parsed only after
    /// every named shard is known to exist, so an unknown shard is reported
    /// ahead of a malformed state.
    pub states: BTreeMap<ShardName, String>,
}

impl UpdateShardState {
    /// Parses the requested state of one shard.
    pub fn parse_state(shard: &ShardName, value: &str) -> Result<SliceState, DecodeError> {
        value
            .parse::<SliceState>()
            .map_err(|e| DecodeError::InvalidValue {
                key: shard.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRoutingRule {
    pub collection: CollectionName,
    pub shard: ShardName,
    pub route_key: String,
    pub range: String,
    pub target_collection: CollectionName,
    pub expire_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRoutingRule {
    pub collection: CollectionName,
    pub shard: ShardName,
    pub route_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReplicaProperty {
    pub collection: CollectionName,
    pub shard: ShardName,
    pub core_node_name: CoreNodeName,
    /// Normalized key: lowercase and prefixed.
    pub property: String,
    pub value: String,
    /// When true, the property is cleared from every other replica of the slice.
    pub shard_unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReplicaProperty {
    pub collection: CollectionName,
    pub shard: ShardName,
    pub core_node_name: CoreNodeName,
    pub property: String,
}

// ============================================================================
// Command
// ============================================================================

/// A decoded, validated topology operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    AddReplica(AddReplica),
    RemoveReplica(RemoveReplica),
    SetShardLeader(SetShardLeader),
    UpdateShardState(UpdateShardState),
    AddRoutingRule(AddRoutingRule),
    RemoveRoutingRule(RemoveRoutingRule),
    AddReplicaProperty(AddReplicaProperty),
    DeleteReplicaProperty(DeleteReplicaProperty),
}

impl Command {
    /// Decodes a message into a typed command.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the operation marker is missing or
    /// unknown, a required field is absent or empty, or a field does not
    /// parse.
    pub fn decode(message: &Message) -> Result<Self, DecodeError> {
        let operation: Operation = message.required(keys::OPERATION)?.parse()?;
        let collection = CollectionName::new(message.required(keys::COLLECTION)?);

        let command = match operation {
            Operation::AddReplica => Command::AddReplica(AddReplica {
                collection,
                shard: message.required(keys::SHARD)?.into(),
                core_node_name: message.non_empty(keys::CORE_NODE_NAME).map(CoreNodeName::from),
                node_name: message.required(keys::NODE_NAME)?.into(),
                core_name: message.required(keys::CORE_NAME)?.to_string(),
                state: message.parsed(keys::STATE)?.unwrap_or(ReplicaState::Down),
                replica_type: message.parsed(keys::REPLICA_TYPE)?.unwrap_or_default(),
                properties: message
                    .iter()
                    .filter(|(k, _)| k.starts_with(PROPERTY_PREFIX))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),

            Operation::RemoveReplica => Command::RemoveReplica(RemoveReplica {
                collection,
                core_node_name: message.non_empty(keys::CORE_NODE_NAME).map(CoreNodeName::from),
                node_name: message.non_empty(keys::NODE_NAME).map(NodeName::from),
            }),

            Operation::Leader => Command::SetShardLeader(SetShardLeader {
                collection,
                shard: message.required(keys::SHARD)?.into(),
                base_url: message.non_empty(keys::BASE_URL).map(str::to_string),
                core_name: message.non_empty(keys::CORE_NAME).map(str::to_string),
            }),

            Operation::UpdateShardState => Command::UpdateShardState(UpdateShardState {
                collection,
                states: message
                    .iter()
                    .filter(|(key, _)| *key != keys::COLLECTION && *key != keys::OPERATION)
                    .map(|(key, value)| (ShardName::new(key), value.to_string()))
                    .collect(),
            }),

            Operation::AddRoutingRule => Command::AddRoutingRule(AddRoutingRule {
                collection,
                shard: message.required(keys::SHARD)?.into(),
                route_key: message.required(keys::ROUTE_KEY)?.to_string(),
                range: message.required(keys::RANGE)?.to_string(),
                target_collection: message.required(keys::TARGET_COLLECTION)?.into(),
                expire_at: message
                    .parsed(keys::EXPIRE_AT)?
                    .ok_or(DecodeError::MissingField(keys::EXPIRE_AT))?,
            }),

            Operation::RemoveRoutingRule => Command::RemoveRoutingRule(RemoveRoutingRule {
                collection,
                shard: message.required(keys::SHARD)?.into(),
                route_key: message.required(keys::ROUTE_KEY)?.to_string(),
            }),

            Operation::AddReplicaProp => {
                let property = normalize_property_key(message.required(keys::PROPERTY)?);
                let value = message.required(keys::PROPERTY_VALUE)?.to_string();
                let shard_unique = message
                    .parsed::<bool>(keys::SHARD_UNIQUE)?
                    .unwrap_or(false)
                    || SLICE_UNIQUE_BOOLEAN_PROPERTIES.contains(&property.as_str());

                if shard_unique && value.parse::<bool>().is_err() {
                    return Err(DecodeError::InvalidValue {
                        key: keys::PROPERTY_VALUE.to_string(),
                        value,
                        reason: format!("slice-unique property '{property}' must be true or false"),
                    });
                }

                Command::AddReplicaProperty(AddReplicaProperty {
                    collection,
                    shard: message.required(keys::SHARD)?.into(),
                    core_node_name: message.required(keys::CORE_NODE_NAME)?.into(),
                    property,
                    value,
                    shard_unique,
                })
            }

            Operation::DeleteReplicaProp => Command::DeleteReplicaProperty(DeleteReplicaProperty {
                collection,
                shard: message.required(keys::SHARD)?.into(),
                core_node_name: message.required(keys::CORE_NODE_NAME)?.into(),
                property: normalize_property_key(message.required(keys::PROPERTY)?),
            }),
        };

        Ok(command)
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::AddReplica(_) => Operation::AddReplica,
            Command::RemoveReplica(_) => Operation::RemoveReplica,
            Command::SetShardLeader(_) => Operation::Leader,
            Command::UpdateShardState(_) => Operation::UpdateShardState,
            Command::AddRoutingRule(_) => Operation::AddRoutingRule,
            Command::RemoveRoutingRule(_) => Operation::RemoveRoutingRule,
            Command::AddReplicaProperty(_) => Operation::AddReplicaProp,
            Command::DeleteReplicaProperty(_) => Operation::DeleteReplicaProp,
        }
    }

    /// The collection every command targets.
    pub fn collection(&self) -> &CollectionName {
        match self {
            Command::AddReplica(c) => &c.collection,
            Command::RemoveReplica(c) => &c.collection,
            Command::SetShardLeader(c) => &c.collection,
            Command::UpdateShardState(c) => &c.collection,
            Command::AddRoutingRule(c) => &c.collection,
            Command::RemoveRoutingRule(c) => &c.collection,
            Command::AddReplicaProperty(c) => &c.collection,
            Command::DeleteReplicaProperty(c) => &c.collection,
        }
    }
}

/// Errors raised while decoding a [`Message`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
