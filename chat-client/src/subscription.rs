//! Topic subscription manager.
//!
//! Callers subscribe to a named topic of an entity; the manager keeps one
//! transport subscription per `(entity, topic)` pair no matter how many
//! callers share it, and closes it when the last one lets go.
//!
//! # Reconnection
//!
//! Link loss is handled by the pure [`LinkState`] machine from
//! `hyperchat-core`; this module executes its actions. After the link is
//! back every pair is reopened, and for a channel's `messages` topic the
//! messages missed while offline are fetched through the channel's
//! `messages` stream (`{"after": <last known id>}`). A topic whose recovery
//! keeps failing is dropped and its handlers are told it was lost.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use hyperchat_core::{BackoffPolicy, LinkAction, LinkEvent, LinkNotice, LinkState};
use hyperchat_types::{CapabilityKind, EntityKind, EntityRef, Envelope, SubscriptionId};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AuthStrategy;
use crate::error::ClientError;
use crate::paginator::Paginator;
use crate::resolver::Resolver;
use crate::transport::{Transport, TransportError};

/// Topic carrying a channel's new messages.
pub const MESSAGES_TOPIC: &str = "messages";
/// Stream used to fetch messages missed while offline.
pub const MESSAGES_STREAM: &str = "messages";

/// What a subscription handler receives.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicEvent {
    /// An envelope arrived on the topic.
    Envelope(Envelope),
    /// The topic is live again after a reconnect. For message topics,
    /// `messages` are the ones missed while offline, ordered by id.
    Recovered {
        /// Recovered messages, already bound into the cache.
        messages: Vec<EntityRef>,
    },
    /// The topic could not be recovered and was dropped.
    Lost {
        /// Topic URL.
        topic: String,
    },
}

impl TopicEvent {
    /// The loss as an error, for handlers that propagate it.
    pub fn as_error(&self) -> Option<ClientError> {
        match self {
            TopicEvent::Lost { topic } => Some(ClientError::SubscriptionLost {
                topic: topic.clone(),
            }),
            _ => None,
        }
    }
}

/// Callback invoked for every event on a topic.
pub type TopicHandler = Arc<dyn Fn(&TopicEvent) + Send + Sync>;

/// One caller's subscription. Pass it back to
/// [`SubscriptionManager::unsubscribe`] to release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    /// Unique id of this handle.
    pub id: SubscriptionId,
    /// Subscribed entity.
    pub entity: EntityRef,
    /// Topic name.
    pub topic: String,
    /// Topic URL.
    pub url: String,
}

/// Outcome of a reconnect cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Link came back.
    pub reconnected: bool,
    /// Topics reopened.
    pub recovered: Vec<String>,
    /// Topics dropped.
    pub lost: Vec<String>,
}

type TopicKey = (EntityRef, String);

struct TopicEntry {
    url: String,
    handlers: Vec<(SubscriptionId, TopicHandler)>,
}

#[derive(Default)]
struct Registry {
    topics: BTreeMap<TopicKey, TopicEntry>,
    handles: HashMap<SubscriptionId, TopicKey>,
}

impl Registry {
    fn handlers_for_url(&self, url: &str) -> Vec<TopicHandler> {
        self.topics
            .values()
            .filter(|entry| entry.url == url)
            .flat_map(|entry| entry.handlers.iter().map(|(_, h)| Arc::clone(h)))
            .collect()
    }

    fn remove(&mut self, key: &TopicKey) -> Option<TopicEntry> {
        let entry = self.topics.remove(key)?;
        for (id, _) in &entry.handlers {
            self.handles.remove(id);
        }
        Some(entry)
    }
}

/// Reference-counted topic subscriptions with reconnect and gap recovery.
pub struct SubscriptionManager<T: Transport> {
    resolver: Resolver<T>,
    paginator: Paginator<T>,
    auth: AuthStrategy,
    policy: BackoffPolicy,
    reconcile_budget: u32,
    registry: Arc<Mutex<Registry>>,
    link: Arc<SyncMutex<LinkState>>,
}

impl<T: Transport> SubscriptionManager<T> {
    /// Create a manager.
    pub fn new(
        resolver: Resolver<T>,
        paginator: Paginator<T>,
        auth: AuthStrategy,
        policy: BackoffPolicy,
        reconcile_budget: u32,
    ) -> Self {
        Self {
            resolver,
            paginator,
            auth,
            policy,
            reconcile_budget: reconcile_budget.max(1),
            registry: Arc::new(Mutex::new(Registry::default())),
            link: Arc::new(SyncMutex::new(LinkState::new())),
        }
    }

    /// Current link state.
    pub fn link_state(&self) -> LinkState {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of open transport subscriptions.
    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.topics.len()
    }

    /// Number of live handles across all topics.
    pub async fn handle_count(&self) -> usize {
        self.registry.lock().await.handles.len()
    }

    // =========================================================================
    // Subscribe / unsubscribe / deliver
    // =========================================================================

    /// Subscribe a handler to an entity's topic.
    pub async fn subscribe(
        &self,
        entity: &EntityRef,
        topic: &str,
        handler: impl Fn(&TopicEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle, ClientError> {
        let capability = self
            .resolver
            .capability(entity, CapabilityKind::Topic, topic)?;
        let key = (*entity, topic.to_string());
        let id = SubscriptionId::new();
        let handler: TopicHandler = Arc::new(handler);

        let mut guard = self.registry.lock().await;
        let registry = &mut *guard;
        let url = match registry.topics.get_mut(&key) {
            Some(entry) => {
                entry.handlers.push((id, handler));
                entry.url.clone()
            }
            None => {
                self.resolver.transport().open_topic(&capability.url).await?;
                debug!("Opened topic {} of {}", topic, entity);
                registry.topics.insert(
                    key.clone(),
                    TopicEntry {
                        url: capability.url.clone(),
                        handlers: vec![(id, handler)],
                    },
                );
                capability.url
            }
        };
        registry.handles.insert(id, key);

        Ok(SubscriptionHandle {
            id,
            entity: *entity,
            topic: topic.to_string(),
            url,
        })
    }

    /// Release a handle. The transport subscription is closed with the last
    /// handle. Returns false if the handle was already released.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<bool, ClientError> {
        let mut registry = self.registry.lock().await;
        let Some(key) = registry.handles.remove(&handle.id) else {
            return Ok(false);
        };

        let now_empty = match registry.topics.get_mut(&key) {
            Some(entry) => {
                entry.handlers.retain(|(id, _)| *id != handle.id);
                entry.handlers.is_empty()
            }
            None => false,
        };

        if now_empty {
            if let Some(entry) = registry.topics.remove(&key) {
                debug!("Closing topic {} of {}", key.1, key.0);
                self.resolver.transport().close_topic(&entry.url).await?;
            }
        }
        Ok(true)
    }

    /// Hand an envelope to every handler of a topic, in subscription order.
    ///
    /// Returns the number of handlers called.
    pub async fn deliver(&self, topic_url: &str, envelope: &Envelope) -> usize {
        let handlers = self.registry.lock().await.handlers_for_url(topic_url);
        let event = TopicEvent::Envelope(envelope.clone());
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Close every topic and forget every handle.
    pub async fn clear(&self) -> Result<(), ClientError> {
        let mut registry = self.registry.lock().await;
        let entries = std::mem::take(&mut registry.topics);
        registry.handles.clear();
        drop(registry);

        for entry in entries.into_values() {
            self.resolver.transport().close_topic(&entry.url).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Link lifecycle
    // =========================================================================

    /// Establish the link.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (_, failure) = self.drive(LinkEvent::ConnectRequested).await?;
        match failure {
            Some(error) => Err(TransportError::ConnectionFailed(error).into()),
            None => Ok(()),
        }
    }

    /// Close the link. Subscriptions stay registered.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.drive(LinkEvent::DisconnectRequested).await?;
        Ok(())
    }

    /// The link dropped: reconnect with backoff, then recover topics.
    pub async fn on_disconnect(&self, reason: &str) -> Result<RecoveryReport, ClientError> {
        let (report, _) = self
            .drive(LinkEvent::TransportLost {
                reason: reason.to_string(),
            })
            .await?;
        Ok(report)
    }

    /// The transport restored the link by itself: recover topics.
    pub async fn on_reconnected(&self) -> Result<RecoveryReport, ClientError> {
        if self.link_state().is_connected() {
            // Our own reconnect already ran recovery
            debug!("Link already up, nothing to recover");
            return Ok(RecoveryReport::default());
        }
        let (report, _) = self.drive(LinkEvent::ConnectSucceeded).await?;
        Ok(report)
    }

    fn transition(&self, event: LinkEvent) -> Vec<LinkAction> {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        let (next, actions) = link.clone().on_event(event, &self.policy);
        *link = next;
        actions
    }

    /// Feed an event to the link machine and execute the resulting actions
    /// until it settles. Returns the recovery report and the initial
    /// connection error, if any.
    async fn drive(&self, event: LinkEvent) -> Result<(RecoveryReport, Option<String>), ClientError> {
        let mut pending = VecDeque::from([event]);
        let mut report = RecoveryReport::default();
        let mut failure = None;

        while let Some(event) = pending.pop_front() {
            for action in self.transition(event) {
                match action {
                    LinkAction::Connect => {
                        match self.resolver.transport().connect(&self.auth).await {
                            Ok(()) => pending.push_back(LinkEvent::ConnectSucceeded),
                            Err(e) => pending.push_back(LinkEvent::ConnectFailed {
                                error: e.to_string(),
                            }),
                        }
                    }
                    LinkAction::Disconnect => {
                        self.resolver.transport().close().await?;
                    }
                    LinkAction::StartReconnectTimer { delay } => {
                        debug!("Reconnecting in {:?}", delay);
                        tokio::time::sleep(delay).await;
                        pending.push_back(LinkEvent::ReconnectTimer);
                    }
                    LinkAction::CancelReconnect => {}
                    LinkAction::ResubscribeAll => {
                        report.reconnected = true;
                        let (recovered, lost) = self.resubscribe_all().await;
                        report.recovered.extend(recovered);
                        report.lost.extend(lost);
                    }
                    LinkAction::GiveUp => {
                        warn!("Reconnect attempts exhausted, dropping all subscriptions");
                        report.lost.extend(self.drop_all().await);
                    }
                    LinkAction::Emit(notice) => match notice {
                        LinkNotice::Connected => info!("Connected"),
                        LinkNotice::Reconnected { attempts } => {
                            info!("Reconnected after {} attempt(s)", attempts)
                        }
                        LinkNotice::Disconnected { reason } => warn!("Link lost: {}", reason),
                        LinkNotice::ConnectionFailed { error } => {
                            warn!("Connection failed: {}", error);
                            failure = Some(error);
                        }
                        LinkNotice::ReconnectFailed { attempt, error } => {
                            warn!("Reconnect attempt {} failed: {}", attempt, error)
                        }
                    },
                }
            }
        }

        Ok((report, failure))
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Reopen every pair. Returns (recovered, lost) topic URLs.
    async fn resubscribe_all(&self) -> (Vec<String>, Vec<String>) {
        let keys: Vec<(TopicKey, String)> = self
            .registry
            .lock()
            .await
            .topics
            .iter()
            .map(|(key, entry)| (key.clone(), entry.url.clone()))
            .collect();

        let mut recovered = Vec::new();
        let mut lost = Vec::new();
        for (key, url) in keys {
            match self.recover(&key, &url).await {
                Ok(messages) => {
                    self.notify(&key, &TopicEvent::Recovered { messages }).await;
                    recovered.push(url);
                }
                Err(e) => {
                    warn!("Subscription to {} lost: {}", url, e);
                    let entry = self.registry.lock().await.remove(&key);
                    if let Err(e) = self.resolver.transport().close_topic(&url).await {
                        debug!("Closing lost topic {} failed: {}", url, e);
                    }
                    if let Some(entry) = entry {
                        let event = TopicEvent::Lost { topic: url.clone() };
                        for (_, handler) in &entry.handlers {
                            handler(&event);
                        }
                    }
                    lost.push(url);
                }
            }
        }
        (recovered, lost)
    }

    /// Reopen one topic and fetch what it missed, within the retry budget.
    async fn recover(&self, key: &TopicKey, url: &str) -> Result<Vec<EntityRef>, ClientError> {
        let mut attempt = 0;
        let mut opened = false;
        loop {
            attempt += 1;
            // Once open, only the reconciliation fetch is retried
            if !opened {
                match self.resolver.transport().open_topic(url).await {
                    Ok(()) => opened = true,
                    Err(e) if attempt >= self.reconcile_budget => return Err(e.into()),
                    Err(e) => {
                        debug!("Reopening {} failed (attempt {}): {}", url, attempt, e);
                        tokio::time::sleep(self.policy.delay(attempt)).await;
                        continue;
                    }
                }
            }
            let result = self.reconcile(key).await;

            match result {
                Ok(messages) => return Ok(messages),
                Err(e) if attempt >= self.reconcile_budget => return Err(e),
                Err(e) => {
                    debug!("Recovery of {} failed (attempt {}): {}", url, attempt, e);
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                }
            }
        }
    }

    /// Fetch messages missed on a channel's message topic, ordered by id.
    async fn reconcile(&self, key: &TopicKey) -> Result<Vec<EntityRef>, ClientError> {
        let (entity, topic) = key;
        if entity.kind != EntityKind::Channel || topic != MESSAGES_TOPIC {
            return Ok(Vec::new());
        }

        let store = self.resolver.store();
        let Some(after) = store.last_known_message(entity.id) else {
            return Ok(Vec::new());
        };

        let stream = match self.paginator.open(
            entity,
            MESSAGES_STREAM,
            EntityKind::Message,
            json!({ "after": after }),
        ) {
            Ok(stream) => stream,
            Err(ClientError::CapabilityUnavailable { .. }) => {
                warn!("{} has no message stream, skipping gap recovery", entity);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut messages: Vec<EntityRef> = stream
            .collect_all()
            .await?
            .into_iter()
            .filter(|message| message.id > after)
            .collect();
        messages.sort();
        messages.dedup();

        if let Some(newest) = messages.last() {
            store.observe_message(entity.id, newest.id);
        }
        Ok(messages)
    }

    async fn notify(&self, key: &TopicKey, event: &TopicEvent) {
        let handlers: Vec<TopicHandler> = self
            .registry
            .lock()
            .await
            .topics
            .get(key)
            .map(|entry| entry.handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in &handlers {
            handler(event);
        }
    }

    /// Drop every pair, telling handlers. Returns the dropped topic URLs.
    async fn drop_all(&self) -> Vec<String> {
        let entries = {
            let mut registry = self.registry.lock().await;
            registry.handles.clear();
            std::mem::take(&mut registry.topics)
        };

        let mut lost = Vec::new();
        for entry in entries.into_values() {
            let event = TopicEvent::Lost {
                topic: entry.url.clone(),
            };
            for (_, handler) in &entry.handlers {
                handler(&event);
            }
            lost.push(entry.url);
        }
        lost
    }
}
