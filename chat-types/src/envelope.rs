//! Envelope - the `{type, payload}` wrapper of every inbound real-time event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EntityId, ReactionSummary, TypesError};

/// Event type discriminator for envelope routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A message was posted.
    NewMessage,
    /// A message was edited.
    MessageUpdated,
    /// A message was deleted.
    MessageDeleted,
    /// Reactions on a message changed.
    ReactionChanged,
    /// Typing indicator changed.
    Typing,
    /// A keystroke was broadcast.
    Keystroke,
    /// A user's read pointer moved.
    ReadReceipt,
    /// Someone joined or left a channel.
    Membership,
    /// Channel metadata changed.
    ChannelUpdated,
    /// A notification for the viewer.
    Notification,
}

impl EventType {
    /// The wire name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewMessage => "newMessage",
            EventType::MessageUpdated => "messageUpdated",
            EventType::MessageDeleted => "messageDeleted",
            EventType::ReactionChanged => "reactionChanged",
            EventType::Typing => "typing",
            EventType::Keystroke => "keystroke",
            EventType::ReadReceipt => "readReceipt",
            EventType::Membership => "membership",
            EventType::ChannelUpdated => "channelUpdated",
            EventType::Notification => "notification",
        }
    }
}

impl TryFrom<&str> for EventType {
    type Error = TypesError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "newMessage" => Ok(EventType::NewMessage),
            "messageUpdated" => Ok(EventType::MessageUpdated),
            "messageDeleted" => Ok(EventType::MessageDeleted),
            "reactionChanged" => Ok(EventType::ReactionChanged),
            "typing" => Ok(EventType::Typing),
            "keystroke" => Ok(EventType::Keystroke),
            "readReceipt" => Ok(EventType::ReadReceipt),
            "membership" => Ok(EventType::Membership),
            "channelUpdated" => Ok(EventType::ChannelUpdated),
            "notification" => Ok(EventType::Notification),
            other => Err(TypesError::malformed(other, "unknown event type")),
        }
    }
}

/// An inbound real-time event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Variant-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(event_type: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
        }
    }

    /// Parse an envelope from JSON text.
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        serde_json::from_str(text).map_err(|e| TypesError::malformed("?", e.to_string()))
    }

    /// Decode the payload according to the envelope type.
    pub fn decode(&self) -> Result<InboundEvent, TypesError> {
        let event_type = EventType::try_from(self.event_type.as_str())?;
        let typed = |reason: serde_json::Error| TypesError::malformed(&self.event_type, reason.to_string());
        let entity = || -> Result<Value, TypesError> {
            if self.payload.is_object() {
                Ok(self.payload.clone())
            } else {
                Err(TypesError::malformed(&self.event_type, "payload is not an object"))
            }
        };

        Ok(match event_type {
            EventType::NewMessage => InboundEvent::NewMessage(entity()?),
            EventType::MessageUpdated => InboundEvent::MessageUpdated(entity()?),
            EventType::MessageDeleted => InboundEvent::MessageDeleted(
                serde_json::from_value(self.payload.clone()).map_err(typed)?,
            ),
            EventType::ReactionChanged => InboundEvent::ReactionChanged(
                serde_json::from_value(self.payload.clone()).map_err(typed)?,
            ),
            EventType::Typing => InboundEvent::Typing(
                serde_json::from_value(self.payload.clone()).map_err(typed)?,
            ),
            EventType::Keystroke => InboundEvent::Keystroke(
                serde_json::from_value(self.payload.clone()).map_err(typed)?,
            ),
            EventType::ReadReceipt => InboundEvent::ReadReceipt(
                serde_json::from_value(self.payload.clone()).map_err(typed)?,
            ),
            EventType::Membership => InboundEvent::Membership(
                serde_json::from_value(self.payload.clone()).map_err(typed)?,
            ),
            EventType::ChannelUpdated => InboundEvent::ChannelUpdated(entity()?),
            EventType::Notification => InboundEvent::Notification(entity()?),
        })
    }
}

/// `messageDeleted` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    /// The deleted message.
    pub id: EntityId,
    /// Its channel.
    pub channel_id: EntityId,
}

/// `reactionChanged` payload. `reactions` is the complete new summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionChanged {
    /// The reacted-to message.
    pub message_id: EntityId,
    /// Full reaction summary after the change.
    #[serde(default)]
    pub reactions: Vec<ReactionSummary>,
}

/// `typing` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    /// The channel.
    pub channel_id: EntityId,
    /// Everyone typing right now.
    #[serde(default)]
    pub user_ids: Vec<EntityId>,
}

/// `keystroke` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeEvent {
    /// The channel.
    pub channel_id: EntityId,
    /// Who typed.
    pub user_id: EntityId,
    /// Draft text, when shared.
    #[serde(default)]
    pub text: String,
}

/// `readReceipt` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// The channel.
    pub channel_id: EntityId,
    /// Whose pointer moved.
    pub user_id: EntityId,
    /// Last message read.
    pub message_id: EntityId,
}

/// Kind of membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MembershipChange {
    /// User joined.
    Joined,
    /// User left.
    Left,
    /// User was removed by someone else.
    Removed,
    /// User hid the channel.
    Hidden,
}

impl MembershipChange {
    /// True for changes that take the channel away from the user.
    pub fn is_departure(&self) -> bool {
        !matches!(self, MembershipChange::Joined)
    }
}

/// `membership` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// The channel.
    pub channel_id: EntityId,
    /// Who changed.
    pub user_id: EntityId,
    /// What happened.
    pub change: MembershipChange,
    /// Updated channel payload, when the server includes it.
    #[serde(default)]
    pub channel: Option<Value>,
}

/// A decoded envelope.
///
/// Entity-bearing variants keep the raw payload so its descriptors can be
/// bound before the domain fields reach the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Raw message payload.
    NewMessage(Value),
    /// Raw message payload.
    MessageUpdated(Value),
    /// Deleted message.
    MessageDeleted(MessageDeleted),
    /// New reaction summary.
    ReactionChanged(ReactionChanged),
    /// Typing set.
    Typing(Typing),
    /// Keystroke.
    Keystroke(KeystrokeEvent),
    /// Read pointer.
    ReadReceipt(ReadReceipt),
    /// Membership change.
    Membership(Membership),
    /// Raw channel payload.
    ChannelUpdated(Value),
    /// Raw notification payload.
    Notification(Value),
}
