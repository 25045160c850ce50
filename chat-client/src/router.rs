//! Inbound event router.
//!
//! Decodes real-time envelopes and turns each into cache mutations. Events
//! about entities that are not cached are ignored rather than creating
//! partial records. Malformed envelopes are logged and dropped; the router
//! never fails.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use hyperchat_core::{field_id, LAST_RECEIVED_MESSAGE, READ_RECEIPTS};
use hyperchat_types::{
    Channel, EntityId, EntityKind, EntityRef, Envelope, InboundEvent, KeystrokeEvent, Membership,
    Notification, ReactionChanged, ReadReceipt, Typing,
};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::resolver::bind_payload;
use crate::shared::SharedStore;

/// Callback receiving notifications that should be shown to the viewer.
pub type NotificationHandler = Arc<dyn Fn(Notification) + Send + Sync>;

/// What routing an envelope did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Entities were merged into the cache.
    Applied(Vec<EntityRef>),
    /// A notification was merged and forwarded to the handler.
    Forwarded(EntityRef),
    /// Entities were evicted.
    Evicted(Vec<EntityRef>),
    /// Nothing to do (entity not cached, notification suppressed, ...).
    Ignored,
    /// The envelope was malformed and dropped.
    Dropped,
}

/// Routes envelopes into the cache.
pub struct Router {
    store: SharedStore,
    viewer: Option<EntityId>,
    on_notification: Option<NotificationHandler>,
    forwarded: Mutex<HashSet<EntityId>>,
}

impl Router {
    /// Create a router over a cache.
    pub fn new(store: SharedStore, viewer: Option<EntityId>) -> Self {
        Self {
            store,
            viewer,
            on_notification: None,
            forwarded: Mutex::new(HashSet::new()),
        }
    }

    /// Set the notification handler.
    pub fn with_notification_handler(
        mut self,
        handler: impl Fn(Notification) + Send + Sync + 'static,
    ) -> Self {
        self.on_notification = Some(Arc::new(handler));
        self
    }

    /// Route one envelope.
    pub fn on_envelope(&self, envelope: &Envelope) -> RouteOutcome {
        let event = match envelope.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed envelope: {}", e);
                return RouteOutcome::Dropped;
            }
        };

        match self.apply(event) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Dropping '{}' envelope: {}", envelope.event_type, e);
                RouteOutcome::Dropped
            }
        }
    }

    fn apply(&self, event: InboundEvent) -> Result<RouteOutcome, ClientError> {
        match event {
            InboundEvent::NewMessage(raw) => self.new_message(raw),
            InboundEvent::MessageUpdated(raw) => {
                Ok(RouteOutcome::Applied(vec![bind_payload(&self.store, EntityKind::Message, raw)?]))
            }
            InboundEvent::MessageDeleted(deleted) => {
                let evicted = self.store.evict(&EntityRef::new(EntityKind::Message, deleted.id));
                Ok(evicted_or_ignored(evicted))
            }
            InboundEvent::ReactionChanged(ReactionChanged {
                message_id,
                reactions,
            }) => Ok(self.patch_cached(
                EntityRef::new(EntityKind::Message, message_id),
                json!({ "reactions": reactions }),
            )),
            InboundEvent::Typing(Typing {
                channel_id,
                user_ids,
            }) => Ok(self.patch_cached(
                EntityRef::new(EntityKind::Channel, channel_id),
                json!({ "typingUserIds": user_ids }),
            )),
            InboundEvent::Keystroke(KeystrokeEvent {
                channel_id,
                user_id,
                text,
            }) => Ok(self.patch_cached(
                EntityRef::new(EntityKind::Channel, channel_id),
                json!({ "lastKeystroke": { "userId": user_id, "text": text } }),
            )),
            InboundEvent::ReadReceipt(receipt) => Ok(self.read_receipt(receipt)),
            InboundEvent::Membership(membership) => self.membership(membership),
            InboundEvent::ChannelUpdated(raw) => {
                Ok(RouteOutcome::Applied(vec![bind_payload(&self.store, EntityKind::Channel, raw)?]))
            }
            InboundEvent::Notification(raw) => self.notification(raw),
        }
    }

    fn new_message(&self, raw: Value) -> Result<RouteOutcome, ClientError> {
        let message = bind_payload(&self.store, EntityKind::Message, raw)?;
        let mut applied = vec![message];

        // Read the bound message and advance its channel under one lock
        let advanced = self.store.write(|store| {
            let record = store.get(&message)?.clone();
            let channel_id = field_id(&record, "channelId")?;
            let channel = EntityRef::new(EntityKind::Channel, channel_id);
            let outcome = store.contains(&channel).then(|| {
                let mut patch = Map::new();
                patch.insert(LAST_RECEIVED_MESSAGE.to_string(), Value::Object(record));
                store.upsert(channel, patch)
            });
            Some((channel, outcome))
        });
        let Some((channel, outcome)) = advanced else {
            return Ok(RouteOutcome::Applied(applied));
        };

        self.store.observe_message(channel.id, message.id);
        match outcome {
            Some(outcome) if outcome.changed() => applied.push(channel),
            Some(_) => debug!("No change to {} (unchanged or stale)", channel),
            None => {}
        }
        Ok(RouteOutcome::Applied(applied))
    }

    fn read_receipt(&self, receipt: ReadReceipt) -> RouteOutcome {
        // The store merges receipts per user, forward only
        let mut receipts = Map::new();
        receipts.insert(
            receipt.user_id.to_string(),
            Value::from(receipt.message_id.value()),
        );
        let mut patch = Map::new();
        patch.insert(READ_RECEIPTS.to_string(), Value::Object(receipts));
        self.patch_cached(
            EntityRef::new(EntityKind::Channel, receipt.channel_id),
            Value::Object(patch),
        )
    }

    fn membership(&self, membership: Membership) -> Result<RouteOutcome, ClientError> {
        let channel = EntityRef::new(EntityKind::Channel, membership.channel_id);
        let viewer_departed =
            self.viewer == Some(membership.user_id) && membership.change.is_departure();

        if viewer_departed {
            debug!("Viewer left {}, evicting", channel);
            return Ok(evicted_or_ignored(self.store.evict(&channel)));
        }

        match membership.channel {
            Some(raw) => Ok(RouteOutcome::Applied(vec![bind_payload(
                &self.store,
                EntityKind::Channel,
                raw,
            )?])),
            None => Ok(RouteOutcome::Ignored),
        }
    }

    fn notification(&self, raw: Value) -> Result<RouteOutcome, ClientError> {
        let entity = bind_payload(&self.store, EntityKind::Notification, raw)?;
        let Some(notification) = self.store.get_as::<Notification>(&entity)? else {
            return Ok(RouteOutcome::Ignored);
        };

        if notification.read || self.is_muted(&notification) {
            return Ok(RouteOutcome::Applied(vec![entity]));
        }

        let first_time = {
            let mut forwarded = self.forwarded.lock().unwrap_or_else(PoisonError::into_inner);
            // Evicted notifications no longer need deduping
            self.store.read(|store| {
                forwarded.retain(|id| store.contains(&EntityRef::new(EntityKind::Notification, *id)))
            });
            forwarded.insert(notification.id)
        };
        if !first_time {
            return Ok(RouteOutcome::Applied(vec![entity]));
        }

        if let Some(handler) = &self.on_notification {
            handler(notification);
        }
        Ok(RouteOutcome::Forwarded(entity))
    }

    /// Muted per the cached channel, falling back to the embedded one.
    fn is_muted(&self, notification: &Notification) -> bool {
        let Some(embedded) = &notification.channel else {
            return false;
        };
        let cached = self
            .store
            .get_as::<Channel>(&EntityRef::new(EntityKind::Channel, embedded.id))
            .ok()
            .flatten();
        cached.map(|channel| channel.muted).unwrap_or(embedded.muted)
    }

    /// Merge a patch into an entity, only if it is cached.
    fn patch_cached(&self, entity: EntityRef, patch: Value) -> RouteOutcome {
        let Value::Object(patch) = patch else {
            return RouteOutcome::Ignored;
        };
        let outcome = self.store.write(|store| {
            store
                .contains(&entity)
                .then(|| store.upsert(entity, patch))
        });

        match outcome {
            Some(outcome) if outcome.changed() => RouteOutcome::Applied(vec![entity]),
            Some(_) => {
                debug!("No change to {} (unchanged or stale)", entity);
                RouteOutcome::Ignored
            }
            None => RouteOutcome::Ignored,
        }
    }

    /// Forget which notifications were forwarded.
    pub fn reset(&self) {
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn evicted_or_ignored(evicted: Vec<EntityRef>) -> RouteOutcome {
    if evicted.is_empty() {
        RouteOutcome::Ignored
    } else {
        RouteOutcome::Evicted(evicted)
    }
}
