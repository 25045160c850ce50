//! Transport abstraction for the Hyperchat client.
//!
//! The engine never performs HTTP or WebSocket I/O itself. Everything goes
//! through a [`Transport`] supplied by the host application, or
//! [`MockTransport`] in tests.
//!
//! # Design
//!
//! The trait is async and request-oriented:
//! - `connect()` establishes the real-time link using the host's auth strategy
//! - `call()` executes one request built from a capability descriptor
//! - `open_topic()` / `close_topic()` manage real-time subscriptions
//!
//! Frames arriving on open topics, and link loss or recovery, flow back into
//! the engine as [`TransportSignal`]s.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect(&AuthStrategy::Unsecured).await?;
//! let body = transport.call(request).await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use hyperchat_types::{CapabilityKind, Envelope};
use serde_json::Value;
use thiserror::Error;

use crate::config::AuthStrategy;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// The server rejected the request.
    #[error("request failed ({status}): {message}")]
    RequestFailed {
        /// Status code reported by the server.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,
}

/// One outbound request, built from a capability descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Descriptor group the URL came from.
    pub kind: CapabilityKind,
    /// Descriptor name.
    pub name: String,
    /// Target URL, exactly as the server provided it.
    pub url: String,
    /// Arguments (query for relays and streams, body for actions).
    pub args: Value,
    /// Opaque pagination cursor, if continuing a stream.
    pub cursor: Option<String>,
}

impl Request {
    /// Attach a pagination cursor.
    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// Something the transport observed on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// An envelope arrived on an open topic.
    Frame {
        /// Topic URL.
        topic: String,
        /// The envelope.
        envelope: Envelope,
    },
    /// The real-time link dropped.
    Disconnected {
        /// Reason reported by the transport.
        reason: String,
    },
    /// The transport re-established the link by itself.
    Reconnected,
}

/// Transport trait for talking to the chat server.
///
/// Implementations handle the underlying connection mechanism
/// (HTTP + WebSocket, SSE, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the real-time link.
    async fn connect(&self, auth: &AuthStrategy) -> Result<(), TransportError>;

    /// Execute one request and return the response body.
    async fn call(&self, request: Request) -> Result<Value, TransportError>;

    /// Start receiving frames for a topic.
    async fn open_topic(&self, url: &str) -> Result<(), TransportError>;

    /// Stop receiving frames for a topic.
    async fn close_topic(&self, url: &str) -> Result<(), TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the link gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
