//! Client error types.

use hyperchat_core::StoreError;
use hyperchat_types::{CapabilityKind, EntityRef, TypesError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The entity's current bundle does not carry the capability.
    ///
    /// Not a transport failure: the server did not offer it.
    #[error("{entity} has no {kind} '{name}'")]
    CapabilityUnavailable {
        /// Entity the capability was looked up on.
        entity: EntityRef,
        /// Capability group.
        kind: CapabilityKind,
        /// Capability name.
        name: String,
    },

    /// An action was rejected or failed in flight; local state was rolled back.
    #[error("action '{action}' failed: {source}")]
    ActionFailed {
        /// Action name.
        action: String,
        /// What went wrong.
        source: TransportError,
    },

    /// A topic could not be recovered after reconnect.
    #[error("subscription to {topic} lost")]
    SubscriptionLost {
        /// Topic URL.
        topic: String,
    },

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Cache error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payload error.
    #[error("payload error: {0}")]
    Types(#[from] TypesError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The server answered with something the engine cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),
}
