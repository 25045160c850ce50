//! Identity types for Hyperchat entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// The four entity kinds the server hands out.
///
/// Ids are only unique within a kind, so every cache key pairs the two.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// A chat participant.
    User,
    /// A direct, public or private conversation.
    Channel,
    /// A single message inside a channel.
    Message,
    /// A per-viewer notification.
    Notification,
}

impl EntityKind {
    /// All kinds, in cache ordering.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::User,
        EntityKind::Channel,
        EntityKind::Message,
        EntityKind::Notification,
    ];

    /// Lower-case name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Channel => "channel",
            EntityKind::Message => "message",
            EntityKind::Notification => "notification",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "channel" => Ok(EntityKind::Channel),
            "message" => Ok(EntityKind::Message),
            "notification" => Ok(EntityKind::Notification),
            other => Err(TypesError::UnknownEntityKind(other.to_string())),
        }
    }
}

/// A stable server-assigned identity, unique within its [`EntityKind`].
///
/// For messages the id is also the ordering key: the server hands them out
/// monotonically, so a larger id is always the newer message.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Create an id from its numeric value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this id.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// A `(kind, id)` pair: the cache key of one entity.
///
/// Ordering is by kind first, then id, so a range over one kind yields
/// entities in id order (and therefore messages in delivery order).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Which kind of entity.
    pub kind: EntityKind,
    /// Identity within that kind.
    pub id: EntityId,
}

impl EntityRef {
    /// Create a reference from its parts.
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    /// Reference to a user.
    pub fn user(id: u64) -> Self {
        Self::new(EntityKind::User, EntityId::new(id))
    }

    /// Reference to a channel.
    pub fn channel(id: u64) -> Self {
        Self::new(EntityKind::Channel, EntityId::new(id))
    }

    /// Reference to a message.
    pub fn message(id: u64) -> Self {
        Self::new(EntityKind::Message, EntityId::new(id))
    }

    /// Reference to a notification.
    pub fn notification(id: u64) -> Self {
        Self::new(EntityKind::Notification, EntityId::new(id))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef({}:{})", self.kind, self.id)
    }
}

/// A unique identifier for one caller's topic subscription.
///
/// UUID v4 format. Several handles can share one transport subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    /// Create a new random SubscriptionId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}
