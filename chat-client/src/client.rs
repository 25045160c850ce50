//! ChatClient - the main interface for the Hyperchat sync engine.
//!
//! This module provides [`ChatClient`], the API applications use to keep a
//! live, locally-consistent model of the chat server's entities.
//!
//! # Architecture
//!
//! ChatClient wires the components together around one shared cache:
//!
//! ```text
//! Application → ChatClient → Resolver → Transport → Network
//!                  ↓      ↘ Dispatcher / Paginator / SubscriptionManager
//!             SharedStore ← Router ← TransportSignal
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hyperchat_client::{ChatClient, EngineConfig, BootstrapConfig, MockTransport};
//!
//! let client = ChatClient::new(EngineConfig::default(), BootstrapConfig::default(), transport);
//! client.connect().await?;
//!
//! let channels = client.load("https://chat.example/me/channels", EntityKind::Channel).await?;
//! client.subscribe(&channels[0], "messages", |event| println!("{:?}", event)).await?;
//! client.dispatch(channels[0], "mute", json!({})).await?;
//! ```

use std::sync::Arc;

use hyperchat_types::{EntityKind, EntityRef, Notification};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use hyperchat_core::LinkState;

use crate::config::{BootstrapConfig, EngineConfig};
use crate::dispatcher::Dispatcher;
use crate::error::ClientError;
use crate::paginator::{PageStream, Paginator};
use crate::resolver::Resolver;
use crate::router::{RouteOutcome, Router};
use crate::shared::SharedStore;
use crate::subscription::{RecoveryReport, SubscriptionHandle, SubscriptionManager, TopicEvent};
use crate::transport::{Transport, TransportSignal};

/// The main chat client.
///
/// Owns the cache and every engine component.
pub struct ChatClient<T: Transport> {
    config: EngineConfig,
    bootstrap: BootstrapConfig,
    store: SharedStore,
    resolver: Resolver<T>,
    paginator: Paginator<T>,
    subscriptions: SubscriptionManager<T>,
    dispatcher: Dispatcher<T>,
    router: Router,
}

impl<T: Transport> ChatClient<T> {
    /// Create a new ChatClient.
    pub fn new(config: EngineConfig, bootstrap: BootstrapConfig, transport: T) -> Self {
        let store = SharedStore::new();
        let resolver = Resolver::new(Arc::new(transport), store.clone());
        let paginator = Paginator::new(resolver.clone(), config.streams.page_size);
        let subscriptions = SubscriptionManager::new(
            resolver.clone(),
            paginator.clone(),
            bootstrap.auth.clone(),
            config.backoff_policy(),
            config.subscriptions.reconcile_retry_budget,
        );
        let dispatcher = Dispatcher::new(resolver.clone(), config.viewer_id);
        let router = Router::new(store.clone(), config.viewer_id);

        Self {
            config,
            bootstrap,
            store,
            resolver,
            paginator,
            subscriptions,
            dispatcher,
            router,
        }
    }

    /// Set the handler for notifications that should reach the viewer.
    pub fn with_notification_handler(
        mut self,
        handler: impl Fn(Notification) + Send + Sync + 'static,
    ) -> Self {
        self.router = self.router.with_notification_handler(handler);
        self
    }

    /// Establish the real-time link using the bootstrap auth strategy.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.subscriptions.connect().await
    }

    /// Close the real-time link.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.subscriptions.disconnect().await
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.subscriptions.link_state().is_connected()
    }

    /// Current link state.
    pub fn link_state(&self) -> LinkState {
        self.subscriptions.link_state()
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Fetch an entry point the host knows the URL of.
    pub async fn load(&self, url: &str, kind: EntityKind) -> Result<Vec<EntityRef>, ClientError> {
        self.resolver.load(url, kind).await
    }

    /// Bind a payload received out of band.
    pub fn bind(&self, kind: EntityKind, raw: Value) -> Result<EntityRef, ClientError> {
        self.resolver.bind(kind, raw)
    }

    /// Follow a relay of a cached entity.
    pub async fn fetch(
        &self,
        entity: &EntityRef,
        relay: &str,
        kind: EntityKind,
    ) -> Result<Vec<EntityRef>, ClientError> {
        self.resolver.fetch(entity, relay, kind).await
    }

    /// Typed view of a cached entity.
    pub fn get<E: DeserializeOwned>(&self, entity: &EntityRef) -> Result<Option<E>, ClientError> {
        Ok(self.store.get_as(entity)?)
    }

    /// Messages of a channel, by id.
    pub fn messages_in(&self, channel: &EntityRef) -> Vec<EntityRef> {
        self.store.read(|store| {
            store
                .messages_in(channel.id)
                .into_iter()
                .map(|(id, _)| EntityRef::new(EntityKind::Message, id))
                .collect()
        })
    }

    /// The shared cache.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Subscribe to a topic of an entity.
    pub async fn subscribe(
        &self,
        entity: &EntityRef,
        topic: &str,
        handler: impl Fn(&TopicEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle, ClientError> {
        self.subscriptions.subscribe(entity, topic, handler).await
    }

    /// Release a subscription.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<bool, ClientError> {
        self.subscriptions.unsubscribe(handle).await
    }

    /// Number of open transport subscriptions.
    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions.active_count().await
    }

    /// Dispatch an action on an entity, optimistically.
    pub async fn dispatch(
        &self,
        entity: EntityRef,
        action: &str,
        args: Value,
    ) -> Result<Option<EntityRef>, ClientError> {
        self.dispatcher.dispatch(entity, action, args).await
    }

    /// Open a paged stream of an entity.
    pub fn open_stream(
        &self,
        entity: &EntityRef,
        stream: &str,
        item_kind: EntityKind,
        args: Value,
    ) -> Result<PageStream<T>, ClientError> {
        self.paginator.open(entity, stream, item_kind, args)
    }

    // =========================================================================
    // Inbound signals
    // =========================================================================

    /// Process one transport signal.
    ///
    /// Frames are routed into the cache first, then handed to the topic's
    /// handlers, so handlers always see the updated cache.
    pub async fn handle_signal(&self, signal: TransportSignal) -> Result<RecoveryReport, ClientError> {
        match signal {
            TransportSignal::Frame { topic, envelope } => {
                let outcome = self.router.on_envelope(&envelope);
                if outcome != RouteOutcome::Dropped {
                    self.subscriptions.deliver(&topic, &envelope).await;
                }
                Ok(RecoveryReport::default())
            }
            TransportSignal::Disconnected { reason } => {
                self.subscriptions.on_disconnect(&reason).await
            }
            TransportSignal::Reconnected => self.subscriptions.on_reconnected().await,
        }
    }

    /// Process signals until the channel closes.
    pub async fn run(&self, mut signals: mpsc::Receiver<TransportSignal>) {
        while let Some(signal) = signals.recv().await {
            match self.handle_signal(signal).await {
                Ok(report) => {
                    for topic in &report.lost {
                        warn!("Subscription to {} lost", topic);
                    }
                }
                Err(e) => warn!("Failed to handle transport signal: {}", e),
            }
        }
        debug!("Signal channel closed");
    }

    /// Close every subscription, drop the cache and the link.
    pub async fn teardown(&self) -> Result<(), ClientError> {
        self.subscriptions.clear().await?;
        self.store.clear();
        self.router.reset();
        if self.is_connected() {
            self.subscriptions.disconnect().await?;
        }
        Ok(())
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The bootstrap configuration.
    pub fn bootstrap(&self) -> &BootstrapConfig {
        &self.bootstrap
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        self.resolver.transport()
    }
}
