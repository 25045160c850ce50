//! Error types for Hyperchat payload decoding.

use thiserror::Error;

/// Errors raised while interpreting server payloads.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Envelope `type` is unknown or its payload does not match the type.
    #[error("malformed envelope ({event_type}): {reason}")]
    MalformedEnvelope {
        /// The raw `type` string carried by the envelope.
        event_type: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Unknown entity kind name.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// Payload is structurally invalid (missing id, not an object, ...).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// JSON decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TypesError {
    /// Shorthand for a malformed envelope error.
    pub fn malformed(event_type: &str, reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            event_type: event_type.to_string(),
            reason: reason.into(),
        }
    }
}
