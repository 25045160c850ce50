//! Domain entities: users, channels, messages and notifications.
//!
//! Each entity is a base struct with a flattened, internally tagged shape
//! enum selected by the payload's `type` field. Descriptor bundles are never
//! part of these types (see [`crate::CapabilityBundle`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{EntityId, EntityKind, EntityRef, TypesError};

/// A chat participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Server identity.
    pub id: EntityId,
    /// Login name.
    pub username: String,
    /// Optional human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Opaque properties, passed through untouched.
    #[serde(default)]
    pub properties: Value,
}

/// Shape of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ChannelKind {
    /// One-to-one conversation.
    Direct {
        /// The two participants.
        #[serde(default)]
        member_ids: Vec<EntityId>,
    },
    /// Open channel anyone may join.
    Public {
        /// Channel name.
        name: String,
        /// Optional description.
        #[serde(default)]
        description: Option<String>,
    },
    /// Invite-only channel.
    Private {
        /// Channel name.
        name: String,
        /// Optional description.
        #[serde(default)]
        description: Option<String>,
    },
}

/// Last keystroke seen on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keystroke {
    /// Who typed.
    pub user_id: EntityId,
    /// Draft text, when the server shares it.
    #[serde(default)]
    pub text: String,
}

/// A conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Server identity.
    pub id: EntityId,
    /// Direct, public or private shape.
    #[serde(flatten)]
    pub kind: ChannelKind,
    /// Viewer muted this channel.
    #[serde(default)]
    pub muted: bool,
    /// Viewer hid this channel.
    #[serde(default)]
    pub hidden: bool,
    /// Viewer is a member.
    #[serde(default)]
    pub joined: bool,
    /// Newest message the server reported for this channel. May be stale.
    #[serde(default)]
    pub last_received_message: Option<Box<Message>>,
    /// Per-user last read message id, keyed by the user id in decimal.
    #[serde(default)]
    pub read_receipts: BTreeMap<String, EntityId>,
    /// Users currently typing.
    #[serde(default)]
    pub typing_user_ids: Vec<EntityId>,
    /// Most recent keystroke event.
    #[serde(default)]
    pub last_keystroke: Option<Keystroke>,
    /// Opaque properties, passed through untouched.
    #[serde(default)]
    pub properties: Value,
}

impl Channel {
    /// Display name for public and private channels.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ChannelKind::Public { name, .. } | ChannelKind::Private { name, .. } => Some(name),
            ChannelKind::Direct { .. } => None,
        }
    }

    /// Last message the given user has read here.
    pub fn last_read_by(&self, user_id: EntityId) -> Option<EntityId> {
        self.read_receipts.get(&user_id.to_string()).copied()
    }
}

/// An attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// File name.
    pub name: String,
    /// MIME type, if known.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(default)]
    pub size: Option<u64>,
}

/// Shape of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MessageContent {
    /// Server-generated text (joins, renames, ...).
    SystemText {
        /// Body.
        text: String,
    },
    /// Server-generated file.
    SystemFile {
        /// Attachment.
        file: FileRef,
    },
    /// Text written by a user.
    UserText {
        /// Author.
        author_id: EntityId,
        /// Body.
        text: String,
    },
    /// File posted by a user.
    UserFile {
        /// Author.
        author_id: EntityId,
        /// Attachment.
        file: FileRef,
    },
}

/// Users who reacted to a message with one emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    /// The emoji.
    pub emoji: String,
    /// Who reacted with it.
    #[serde(default)]
    pub user_ids: Vec<EntityId>,
}

/// A message in a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server identity; also the ordering key within a channel.
    pub id: EntityId,
    /// Owning channel.
    pub channel_id: EntityId,
    /// Thread parent, for replies.
    #[serde(default)]
    pub parent_message_id: Option<EntityId>,
    /// Creation time as sent by the server. Informational only.
    #[serde(default)]
    pub created_time: Option<String>,
    /// Server-assigned edit time.
    #[serde(default)]
    pub edited_time: Option<String>,
    /// Viewer has read this message.
    #[serde(default)]
    pub read: bool,
    /// Message was deleted but the server still reports it.
    #[serde(default)]
    pub deleted: bool,
    /// Reactions grouped by emoji.
    #[serde(default)]
    pub reactions: Vec<ReactionSummary>,
    /// System/user, text/file shape.
    #[serde(flatten)]
    pub content: MessageContent,
    /// Opaque properties, passed through untouched.
    #[serde(default)]
    pub properties: Value,
}

impl Message {
    /// Text body, for text messages.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::SystemText { text } | MessageContent::UserText { text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }
}

/// Variant-specific notification data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum NotificationData {
    /// A new message in a channel the viewer follows.
    NewMessage {
        /// The message.
        message: Message,
    },
    /// A reply in a thread the viewer takes part in.
    ThreadReply {
        /// The reply.
        message: Message,
        /// The thread root.
        parent_message: Message,
    },
    /// The viewer was mentioned.
    Mention {
        /// The mentioning message.
        message: Message,
    },
    /// Someone reacted to the viewer's message.
    Reaction {
        /// The reacted-to message.
        message: Message,
        /// Which emoji.
        emoji: String,
        /// Who reacted.
        user_id: EntityId,
    },
    /// The viewer was invited to a channel.
    ChannelInvite {
        /// Who sent the invite.
        inviter_id: EntityId,
    },
}

impl NotificationData {
    /// Messages carried by this variant (message first, then parent).
    pub fn messages(&self) -> Vec<&Message> {
        match self {
            NotificationData::NewMessage { message }
            | NotificationData::Mention { message }
            | NotificationData::Reaction { message, .. } => vec![message],
            NotificationData::ThreadReply {
                message,
                parent_message,
            } => vec![message, parent_message],
            NotificationData::ChannelInvite { .. } => vec![],
        }
    }
}

/// A per-viewer notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server identity.
    pub id: EntityId,
    /// Channel the notification is about. `None` when the channel is
    /// inaccessible or deleted.
    #[serde(default)]
    pub channel: Option<Channel>,
    /// Viewer already read it.
    #[serde(default)]
    pub read: bool,
    /// Creation time as sent by the server.
    #[serde(default)]
    pub created_time: Option<String>,
    /// Variant payload.
    #[serde(flatten)]
    pub data: NotificationData,
    /// Opaque properties, passed through untouched.
    #[serde(default)]
    pub properties: Value,
}

/// Any cached entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// A user.
    User(User),
    /// A channel.
    Channel(Channel),
    /// A message.
    Message(Message),
    /// A notification.
    Notification(Notification),
}

impl Entity {
    /// Decode a domain payload (descriptors already removed) of a known kind.
    pub fn from_value(kind: EntityKind, value: Value) -> Result<Self, TypesError> {
        Ok(match kind {
            EntityKind::User => Entity::User(serde_json::from_value(value)?),
            EntityKind::Channel => Entity::Channel(serde_json::from_value(value)?),
            EntityKind::Message => Entity::Message(serde_json::from_value(value)?),
            EntityKind::Notification => Entity::Notification(serde_json::from_value(value)?),
        })
    }

    /// The entity's kind.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Channel(_) => EntityKind::Channel,
            Entity::Message(_) => EntityKind::Message,
            Entity::Notification(_) => EntityKind::Notification,
        }
    }

    /// The entity's id.
    pub fn id(&self) -> EntityId {
        match self {
            Entity::User(u) => u.id,
            Entity::Channel(c) => c.id,
            Entity::Message(m) => m.id,
            Entity::Notification(n) => n.id,
        }
    }

    /// Cache key of this entity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }
}

/// Read the numeric `id` of a raw payload.
pub fn id_of(value: &Value) -> Option<EntityId> {
    value.get("id").and_then(Value::as_u64).map(EntityId::new)
}
