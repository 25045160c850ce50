//! # chat-types
//!
//! Entity, capability and envelope types for the Hyperchat sync engine.
//!
//! This crate provides the foundational types used across all Hyperchat crates:
//! - [`EntityKind`], [`EntityId`], [`EntityRef`], [`SubscriptionId`] - Identity types
//! - [`User`], [`Channel`], [`Message`], [`Notification`] - Domain entities
//! - [`CapabilityBundle`] - Hypermedia descriptors split off each payload
//! - [`Envelope`] - Inbound real-time event wrapper
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod capability;
mod entity;
mod envelope;
mod error;
mod ids;

pub use capability::{CapabilityBundle, CapabilityKind};
pub use entity::{
    id_of, Channel, ChannelKind, Entity, FileRef, Keystroke, Message, MessageContent,
    Notification, NotificationData, ReactionSummary, User,
};
pub use envelope::{
    Envelope, EventType, InboundEvent, KeystrokeEvent, Membership, MembershipChange,
    MessageDeleted, ReactionChanged, ReadReceipt, Typing,
};
pub use error::TypesError;
pub use ids::{EntityId, EntityKind, EntityRef, SubscriptionId};
