//! Shared handle on the client-side cache.
//!
//! Every component holds a clone of [`SharedStore`]. The closures passed to
//! [`SharedStore::write`] are the only way to mutate the cache; they run
//! under a synchronous lock and can never suspend, so a mutation is always
//! applied as a whole.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hyperchat_core::{ChannelCursors, EntityStore, StoreError};
use hyperchat_types::{CapabilityBundle, EntityId, EntityKind, EntityRef};
use serde::de::DeserializeOwned;

/// Cloneable handle on the entity cache and the per-channel message cursors.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    store: Arc<Mutex<EntityStore>>,
    cursors: Arc<Mutex<ChannelCursors>>,
}

impl SharedStore {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, EntityStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cursors(&self) -> MutexGuard<'_, ChannelCursors> {
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read-only closure against the cache.
    pub fn read<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> R {
        f(&self.store())
    }

    /// Run a mutation against the cache.
    pub fn write<R>(&self, f: impl FnOnce(&mut EntityStore) -> R) -> R {
        f(&mut self.store())
    }

    /// Typed view of a cached entity.
    pub fn get_as<E: DeserializeOwned>(&self, entity: &EntityRef) -> Result<Option<E>, StoreError> {
        self.read(|store| store.get_as(entity))
    }

    /// Check whether an entity is cached.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.read(|store| store.contains(entity))
    }

    /// Copy of an entity's capability bundle.
    pub fn capabilities(&self, entity: &EntityRef) -> Option<CapabilityBundle> {
        self.read(|store| store.capabilities(entity).cloned())
    }

    /// Evict an entity and its dependents, forgetting cursors of evicted channels.
    pub fn evict(&self, entity: &EntityRef) -> Vec<EntityRef> {
        let evicted = self.write(|store| store.evict(entity));
        if entity.kind == EntityKind::Channel {
            self.cursors().forget(entity.id);
        }
        evicted
    }

    /// Record that a message was seen on a channel.
    pub fn observe_message(&self, channel: EntityId, message: EntityId) -> bool {
        self.cursors().observe(channel, message)
    }

    /// Highest message id known for a channel, whether or not the message
    /// is still cached.
    pub fn last_known_message(&self, channel: EntityId) -> Option<EntityId> {
        let cached = self.read(|store| store.last_message_id(channel));
        let observed = self.cursors().last_known(channel);
        cached.max(observed)
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.store().clear();
        self.cursors().clear();
    }
}
