//! # hyperchat-client
//!
//! Client sync engine for the Hyperchat hypermedia chat API.
//!
//! The server describes what can be done with each entity through the
//! capability descriptors it attaches to every payload. This crate keeps a
//! live local model of those entities and only ever talks to the server
//! through the URLs the descriptors carry.
//!
//! ## Features
//!
//! - **Normalized Cache**: one record per entity, merged field by field
//! - **Hypermedia Resolution**: relays, actions, topics and streams by name
//! - **Resilient Subscriptions**: reference counted topics, reconnect with
//!   backoff, missed-message reconciliation
//! - **Optimistic Actions**: local patch first, exact rollback on failure
//! - **Transport Abstraction**: pluggable transport layer (mock included)
//!
//! ## Example
//!
//! ```ignore
//! use hyperchat_client::{ChatClient, EngineConfig, BootstrapConfig};
//!
//! let config = EngineConfig::from_file("hyperchat.toml")?;
//! let client = ChatClient::new(config, BootstrapConfig::default(), transport);
//! client.connect().await?;
//!
//! let channels = client.load(entry_url, EntityKind::Channel).await?;
//! let mut page = client.open_stream(&channels[0], "messages", EntityKind::Message, json!({}))?;
//! while let Some(page) = page.next().await? {
//!     render(page.items);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod paginator;
pub mod resolver;
pub mod router;
pub mod shared;
pub mod subscription;
pub mod transport;

pub use client::ChatClient;
pub use config::{
    AuthStrategy, BackoffConfig, BootstrapConfig, ConfigError, EngineConfig, StreamConfig,
    SubscriptionConfig,
};
pub use dispatcher::Dispatcher;
pub use error::ClientError;
pub use paginator::{Page, PageStream, Paginator};
pub use resolver::{Capability, Resolver};
pub use router::{NotificationHandler, RouteOutcome, Router};
pub use shared::SharedStore;
pub use subscription::{
    RecoveryReport, SubscriptionHandle, SubscriptionManager, TopicEvent, TopicHandler,
    MESSAGES_STREAM, MESSAGES_TOPIC,
};
pub use transport::{MockTransport, Request, Transport, TransportError, TransportSignal};
