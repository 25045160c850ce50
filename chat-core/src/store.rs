//! Normalized entity cache.
//!
//! Records are kept as JSON objects keyed by [`EntityRef`]. A merge-patch
//! overwrites the top-level fields it carries; object and array valued
//! fields (relations such as `reactions` or `lastReceivedMessage`) are
//! replaced wholesale because the server always sends complete sub-objects.
//!
//! Capability bundles live in a side-table next to the records so that a
//! record never contains transport wiring.
//!
//! Stale protection:
//! - `revision`: a patch with a lower revision than the cached one is dropped
//! - `lastReceivedMessage`: an embedded message with a lower id is dropped
//! - `readReceipts`: merged per user; a pointer that would move backwards is
//!   dropped while the other users' pointers still apply
//!
//! Dropping is silent and reported as [`MergeOutcome::StaleDiscarded`].

use hyperchat_types::{
    id_of, CapabilityBundle, Entity, EntityId, EntityKind, EntityRef, TypesError,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A cached entity: its domain fields as a JSON object.
pub type Record = Map<String, Value>;

/// Field whose embedded message may only move forward.
pub const LAST_RECEIVED_MESSAGE: &str = "lastReceivedMessage";
/// Field whose per-user pointers may only move forward.
pub const READ_RECEIPTS: &str = "readReceipts";
/// Monotonic revision counter, when the server provides one.
pub const REVISION: &str = "revision";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A patch was not a JSON object.
    #[error("patch for {entity} is not an object")]
    NotAnObject {
        /// Target entity.
        entity: EntityRef,
    },

    /// A cached record could not be decoded into its typed form.
    #[error("cannot decode {entity}: {source}")]
    Decode {
        /// Entity being decoded.
        entity: EntityRef,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A cached record does not match any shape of its kind.
    #[error("cannot interpret {entity}: {source}")]
    Shape {
        /// Entity being decoded.
        entity: EntityRef,
        /// Underlying decoding error.
        source: TypesError,
    },
}

/// Result of one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The identity was not cached before.
    Created,
    /// At least one field changed.
    Updated,
    /// The patch matched the cached state.
    Unchanged,
    /// The patch (or all of its changing fields) was older than the cache.
    StaleDiscarded,
}

impl MergeOutcome {
    /// True when the cache changed.
    pub fn changed(&self) -> bool {
        matches!(self, MergeOutcome::Created | MergeOutcome::Updated)
    }
}

/// State of one record before an optimistic patch, for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    record: Option<Record>,
}

impl Snapshot {
    /// The captured record, if the entity was cached.
    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }
}

/// Normalized, id-keyed cache of every known entity.
///
/// All methods are synchronous; nothing here performs I/O.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    records: BTreeMap<EntityRef, Record>,
    capabilities: HashMap<EntityRef, CapabilityBundle>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a patch into the cache.
    ///
    /// The patch's `id` is forced to the target id.
    pub fn upsert(&mut self, entity: EntityRef, mut patch: Record) -> MergeOutcome {
        patch.insert("id".to_string(), Value::from(entity.id.value()));

        let Some(existing) = self.records.get_mut(&entity) else {
            self.records.insert(entity, patch);
            return MergeOutcome::Created;
        };

        if let (Some(incoming), Some(cached)) = (revision(&patch), revision(existing)) {
            if incoming < cached {
                return MergeOutcome::StaleDiscarded;
            }
        }

        let mut changed = false;
        let mut discarded = false;
        for (key, value) in patch {
            let (value, stale) = merge_field(&key, value, existing.get(&key));
            discarded |= stale;
            let Some(value) = value else {
                continue;
            };
            if existing.get(&key) != Some(&value) {
                existing.insert(key, value);
                changed = true;
            }
        }

        if changed {
            MergeOutcome::Updated
        } else if discarded {
            MergeOutcome::StaleDiscarded
        } else {
            MergeOutcome::Unchanged
        }
    }

    /// Merge a patch given as an arbitrary JSON value.
    pub fn upsert_value(
        &mut self,
        entity: EntityRef,
        patch: Value,
    ) -> Result<MergeOutcome, StoreError> {
        match patch {
            Value::Object(patch) => Ok(self.upsert(entity, patch)),
            _ => Err(StoreError::NotAnObject { entity }),
        }
    }

    /// Current record of an entity.
    pub fn get(&self, entity: &EntityRef) -> Option<&Record> {
        self.records.get(entity)
    }

    /// Check whether an entity is cached.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.records.contains_key(entity)
    }

    /// Decode a cached record into a typed value.
    pub fn get_as<T: DeserializeOwned>(&self, entity: &EntityRef) -> Result<Option<T>, StoreError> {
        let Some(record) = self.records.get(entity) else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(record.clone()))
            .map(Some)
            .map_err(|source| StoreError::Decode {
                entity: *entity,
                source,
            })
    }

    /// Decode a cached record into an [`Entity`].
    pub fn get_entity(&self, entity: &EntityRef) -> Result<Option<Entity>, StoreError> {
        let Some(record) = self.records.get(entity) else {
            return Ok(None);
        };
        Entity::from_value(entity.kind, Value::Object(record.clone()))
            .map(Some)
            .map_err(|source| StoreError::Shape {
                entity: *entity,
                source,
            })
    }

    /// Remove an identity and everything whose parent no longer resolves.
    ///
    /// Evicting a channel also evicts its cached messages and the
    /// notifications that point at it. Returns every evicted reference.
    pub fn evict(&mut self, entity: &EntityRef) -> Vec<EntityRef> {
        let mut evicted = Vec::new();
        if self.records.remove(entity).is_some() {
            evicted.push(*entity);
        }
        self.capabilities.remove(entity);

        if entity.kind == EntityKind::Channel {
            let dependents: Vec<EntityRef> = self
                .records
                .iter()
                .filter(|(key, record)| belongs_to_channel(key, record, entity.id))
                .map(|(key, _)| *key)
                .collect();
            for dependent in dependents {
                self.records.remove(&dependent);
                self.capabilities.remove(&dependent);
                evicted.push(dependent);
            }
        }

        evicted
    }

    /// Capture the current record of one identity.
    pub fn snapshot(&self, entity: &EntityRef) -> Snapshot {
        Snapshot {
            record: self.records.get(entity).cloned(),
        }
    }

    /// Undo an optimistic patch taken on top of `snapshot`.
    ///
    /// Every field the patch set that still holds the patched value goes back
    /// to its snapshot value (or is removed if it was absent). Fields written
    /// by someone else in the meantime are kept, as is the bundle.
    pub fn revert(&mut self, entity: &EntityRef, snapshot: &Snapshot, patch: &Record) {
        let Some(current) = self.records.get_mut(entity) else {
            return;
        };

        let Some(before) = &snapshot.record else {
            // The patch created the record; drop it unless others wrote to it
            let untouched = current
                .iter()
                .all(|(key, value)| key == "id" || patch.get(key) == Some(value));
            if untouched {
                self.records.remove(entity);
            }
            return;
        };

        for (key, value) in patch {
            if key == "id" || current.get(key) != Some(value) {
                continue;
            }
            match before.get(key) {
                Some(prior) => {
                    current.insert(key.clone(), prior.clone());
                }
                None => {
                    current.remove(key);
                }
            }
        }
    }

    /// Replace the capability bundle of an entity.
    pub fn bind_capabilities(&mut self, entity: EntityRef, bundle: CapabilityBundle) {
        self.capabilities.insert(entity, bundle);
    }

    /// Capability bundle of an entity.
    pub fn capabilities(&self, entity: &EntityRef) -> Option<&CapabilityBundle> {
        self.capabilities.get(entity)
    }

    /// Cached messages of a channel, ordered by id.
    pub fn messages_in(&self, channel_id: EntityId) -> Vec<(EntityId, &Record)> {
        let start = EntityRef::new(EntityKind::Message, EntityId::new(0));
        let end = EntityRef::new(EntityKind::Message, EntityId::new(u64::MAX));
        self.records
            .range(start..=end)
            .filter(|(_, record)| field_id(record, "channelId") == Some(channel_id))
            .map(|(key, record)| (key.id, record))
            .collect()
    }

    /// Highest message id known for a channel, from cached messages or the
    /// channel's `lastReceivedMessage`.
    pub fn last_message_id(&self, channel_id: EntityId) -> Option<EntityId> {
        let cached = self.messages_in(channel_id).last().map(|(id, _)| *id);
        let reported = self
            .records
            .get(&EntityRef::new(EntityKind::Channel, channel_id))
            .and_then(|channel| channel.get(LAST_RECEIVED_MESSAGE))
            .and_then(id_of);
        cached.max(reported)
    }

    /// All cached references of one kind, in id order.
    pub fn refs_of(&self, kind: EntityKind) -> Vec<EntityRef> {
        self.records
            .keys()
            .filter(|key| key.kind == kind)
            .copied()
            .collect()
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop everything (client teardown).
    pub fn clear(&mut self) {
        self.records.clear();
        self.capabilities.clear();
    }
}

/// Read an id-valued field (`"channelId": 4` or `"channel": {"id": 4}`).
pub fn field_id(record: &Record, key: &str) -> Option<EntityId> {
    match record.get(key)? {
        Value::Number(n) => n.as_u64().map(EntityId::new),
        object @ Value::Object(_) => id_of(object),
        _ => None,
    }
}

fn revision(record: &Record) -> Option<u64> {
    record.get(REVISION).and_then(Value::as_u64)
}

fn belongs_to_channel(key: &EntityRef, record: &Record, channel_id: EntityId) -> bool {
    match key.kind {
        EntityKind::Message => field_id(record, "channelId") == Some(channel_id),
        EntityKind::Notification => field_id(record, "channel") == Some(channel_id),
        _ => false,
    }
}

/// Decide what to write for one patched field.
///
/// Returns the value to store (`None`: keep the cached one) and whether
/// anything in the incoming value was stale.
fn merge_field(key: &str, incoming: Value, cached: Option<&Value>) -> (Option<Value>, bool) {
    let Some(cached) = cached else {
        return (Some(incoming), false);
    };
    match key {
        LAST_RECEIVED_MESSAGE => match (id_of(&incoming), id_of(cached)) {
            (Some(new), Some(old)) if new < old => (None, true),
            _ => (Some(incoming), false),
        },
        READ_RECEIPTS => match (incoming, cached.as_object()) {
            (Value::Object(incoming), Some(old)) => {
                let (merged, regressed) = merge_receipts(incoming, old);
                (Some(Value::Object(merged)), regressed)
            }
            (incoming, _) => (Some(incoming), false),
        },
        _ => (Some(incoming), false),
    }
}

/// Per-user forward-only merge of read pointers.
fn merge_receipts(
    incoming: Map<String, Value>,
    cached: &Map<String, Value>,
) -> (Map<String, Value>, bool) {
    let mut merged = cached.clone();
    let mut regressed = false;
    for (user, pointer) in incoming {
        match (pointer.as_u64(), merged.get(&user).and_then(Value::as_u64)) {
            (Some(new), Some(old)) if new < old => regressed = true,
            _ => {
                merged.insert(user, pointer);
            }
        }
    }
    (merged, regressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperchat_types::{Channel, Message};
    use serde_json::json;

    fn object(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn message(id: u64, channel: u64, text: &str) -> Record {
        object(json!({
            "id": id,
            "channelId": channel,
            "type": "UserText",
            "authorId": 3,
            "text": text
        }))
    }

    fn channel(id: u64) -> Record {
        object(json!({ "id": id, "type": "Public", "name": "general" }))
    }

    // ===========================================
    // Upsert Tests
    // ===========================================

    #[test]
    fn first_upsert_creates() {
        let mut store = EntityStore::new();
        let outcome = store.upsert(EntityRef::message(1), message(1, 9, "hi"));
        assert_eq!(outcome, MergeOutcome::Created);
        assert!(store.contains(&EntityRef::message(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn scalar_fields_are_overwritten() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::message(1), message(1, 9, "hi"));

        let outcome = store.upsert(EntityRef::message(1), object(json!({ "text": "edited" })));

        assert_eq!(outcome, MergeOutcome::Updated);
        let record = store.get(&EntityRef::message(1)).unwrap();
        assert_eq!(record["text"], "edited");
        assert_eq!(record["authorId"], 3);
    }

    #[test]
    fn relation_fields_are_replaced_wholesale() {
        let mut store = EntityStore::new();
        let mut initial = message(1, 9, "hi");
        initial.insert(
            "reactions".into(),
            json!([{ "emoji": "👍", "userIds": [1, 2] }, { "emoji": "🎉", "userIds": [3] }]),
        );
        store.upsert(EntityRef::message(1), initial);

        store.upsert(
            EntityRef::message(1),
            object(json!({ "reactions": [{ "emoji": "👍", "userIds": [2] }] })),
        );

        let record = store.get(&EntityRef::message(1)).unwrap();
        assert_eq!(record["reactions"], json!([{ "emoji": "👍", "userIds": [2] }]));
    }

    #[test]
    fn identical_patch_twice_is_idempotent() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::channel(9), channel(9));
        let patch = object(json!({
            "muted": true,
            "lastReceivedMessage": message(5, 9, "five")
        }));

        store.upsert(EntityRef::channel(9), patch.clone());
        let once = store.snapshot(&EntityRef::channel(9));
        let outcome = store.upsert(EntityRef::channel(9), patch);
        let twice = store.snapshot(&EntityRef::channel(9));

        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(once, twice);
    }

    #[test]
    fn patch_id_is_forced_to_target() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::message(1), object(json!({ "id": 77, "channelId": 9 })));
        assert_eq!(store.get(&EntityRef::message(1)).unwrap()["id"], 1);
    }

    #[test]
    fn upsert_value_rejects_non_objects() {
        let mut store = EntityStore::new();
        let result = store.upsert_value(EntityRef::user(1), json!([1]));
        assert!(matches!(result, Err(StoreError::NotAnObject { .. })));
    }

    // ===========================================
    // Staleness Tests
    // ===========================================

    #[test]
    fn older_last_received_message_leaves_state_unchanged() {
        let mut store = EntityStore::new();
        let mut initial = channel(9);
        initial.insert(LAST_RECEIVED_MESSAGE.into(), Value::Object(message(20, 9, "new")));
        store.upsert(EntityRef::channel(9), initial);
        let before = store.snapshot(&EntityRef::channel(9));

        let outcome = store.upsert(
            EntityRef::channel(9),
            object(json!({ "lastReceivedMessage": message(12, 9, "old") })),
        );

        assert_eq!(outcome, MergeOutcome::StaleDiscarded);
        assert_eq!(store.snapshot(&EntityRef::channel(9)), before);
    }

    #[test]
    fn stale_field_is_dropped_but_fresh_fields_apply() {
        let mut store = EntityStore::new();
        let mut initial = channel(9);
        initial.insert(LAST_RECEIVED_MESSAGE.into(), Value::Object(message(20, 9, "new")));
        store.upsert(EntityRef::channel(9), initial);

        let outcome = store.upsert(
            EntityRef::channel(9),
            object(json!({ "lastReceivedMessage": message(12, 9, "old"), "muted": true })),
        );

        assert_eq!(outcome, MergeOutcome::Updated);
        let channel: Channel = store.get_as(&EntityRef::channel(9)).unwrap().unwrap();
        assert!(channel.muted);
        assert_eq!(
            channel.last_received_message.map(|m| m.id),
            Some(EntityId::new(20))
        );
    }

    #[test]
    fn newer_last_received_message_applies() {
        let mut store = EntityStore::new();
        let mut initial = channel(9);
        initial.insert(LAST_RECEIVED_MESSAGE.into(), Value::Object(message(20, 9, "a")));
        store.upsert(EntityRef::channel(9), initial);

        let outcome = store.upsert(
            EntityRef::channel(9),
            object(json!({ "lastReceivedMessage": message(21, 9, "b") })),
        );
        assert_eq!(outcome, MergeOutcome::Updated);
    }

    #[test]
    fn lower_revision_discards_whole_patch() {
        let mut store = EntityStore::new();
        store.upsert(
            EntityRef::user(1),
            object(json!({ "username": "ada", "revision": 4 })),
        );

        let outcome = store.upsert(
            EntityRef::user(1),
            object(json!({ "username": "old-ada", "revision": 3 })),
        );

        assert_eq!(outcome, MergeOutcome::StaleDiscarded);
        assert_eq!(store.get(&EntityRef::user(1)).unwrap()["username"], "ada");
    }

    #[test]
    fn read_receipts_never_move_backwards() {
        let mut store = EntityStore::new();
        let mut initial = channel(9);
        initial.insert(READ_RECEIPTS.into(), json!({ "3": 40, "4": 10 }));
        store.upsert(EntityRef::channel(9), initial);

        let outcome = store.upsert(
            EntityRef::channel(9),
            object(json!({ "readReceipts": { "3": 35 } })),
        );
        assert_eq!(outcome, MergeOutcome::StaleDiscarded);

        let outcome = store.upsert(
            EntityRef::channel(9),
            object(json!({ "readReceipts": { "3": 41 } })),
        );
        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(
            store.get(&EntityRef::channel(9)).unwrap()[READ_RECEIPTS],
            json!({ "3": 41, "4": 10 })
        );
    }

    #[test]
    fn receipts_merge_per_user_when_one_pointer_regresses() {
        let mut store = EntityStore::new();
        let mut initial = channel(9);
        initial.insert(READ_RECEIPTS.into(), json!({ "3": 40, "4": 10 }));
        store.upsert(EntityRef::channel(9), initial);

        let outcome = store.upsert(
            EntityRef::channel(9),
            object(json!({ "readReceipts": { "3": 39, "4": 30, "5": 12 } })),
        );

        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(
            store.get(&EntityRef::channel(9)).unwrap()[READ_RECEIPTS],
            json!({ "3": 40, "4": 30, "5": 12 })
        );
    }

    // ===========================================
    // Eviction Tests
    // ===========================================

    #[test]
    fn evicting_channel_cascades_to_messages_and_notifications() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::channel(9), channel(9));
        store.upsert(EntityRef::channel(8), channel(8));
        store.upsert(EntityRef::message(1), message(1, 9, "a"));
        store.upsert(EntityRef::message(2), message(2, 8, "b"));
        store.upsert(
            EntityRef::notification(5),
            object(json!({ "type": "Mention", "channel": channel(9), "message": message(1, 9, "a") })),
        );
        store.bind_capabilities(EntityRef::message(1), CapabilityBundle::new());

        let evicted = store.evict(&EntityRef::channel(9));

        assert_eq!(
            evicted,
            vec![
                EntityRef::channel(9),
                EntityRef::message(1),
                EntityRef::notification(5)
            ]
        );
        assert!(store.contains(&EntityRef::message(2)));
        assert!(store.capabilities(&EntityRef::message(1)).is_none());
    }

    #[test]
    fn evicting_unknown_entity_is_noop() {
        let mut store = EntityStore::new();
        assert!(store.evict(&EntityRef::user(1)).is_empty());
    }

    // ===========================================
    // Snapshot / Revert Tests
    // ===========================================

    #[test]
    fn revert_returns_exact_prior_state() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::message(1), message(1, 9, "original"));
        let before = store.snapshot(&EntityRef::message(1));

        let patch = object(json!({ "text": "optimistic", "editedTime": "now" }));
        store.upsert(EntityRef::message(1), patch.clone());
        store.revert(&EntityRef::message(1), &before, &patch);

        assert_eq!(store.snapshot(&EntityRef::message(1)), before);
        assert!(!store.get(&EntityRef::message(1)).unwrap().contains_key("editedTime"));
    }

    #[test]
    fn revert_keeps_fields_written_since() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::message(1), message(1, 9, "original"));
        let before = store.snapshot(&EntityRef::message(1));

        let patch = object(json!({ "text": "optimistic" }));
        store.upsert(EntityRef::message(1), patch.clone());
        store.upsert(
            EntityRef::message(1),
            object(json!({ "reactions": [{ "emoji": "👍", "userIds": [5] }] })),
        );
        store.revert(&EntityRef::message(1), &before, &patch);

        let record = store.get(&EntityRef::message(1)).unwrap();
        assert_eq!(record["text"], "original");
        assert_eq!(record["reactions"][0]["userIds"], json!([5]));
    }

    #[test]
    fn revert_skips_fields_the_server_overwrote() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::message(1), message(1, 9, "original"));
        let before = store.snapshot(&EntityRef::message(1));

        let patch = object(json!({ "text": "optimistic" }));
        store.upsert(EntityRef::message(1), patch.clone());
        store.upsert(EntityRef::message(1), object(json!({ "text": "from server" })));
        store.revert(&EntityRef::message(1), &before, &patch);

        assert_eq!(store.get(&EntityRef::message(1)).unwrap()["text"], "from server");
    }

    #[test]
    fn revert_of_created_record_removes() {
        let mut store = EntityStore::new();
        let before = store.snapshot(&EntityRef::message(1));
        let patch = message(1, 9, "x");
        store.upsert(EntityRef::message(1), patch.clone());

        store.revert(&EntityRef::message(1), &before, &patch);

        assert!(!store.contains(&EntityRef::message(1)));
    }

    // ===========================================
    // Query Tests
    // ===========================================

    #[test]
    fn messages_in_channel_are_ordered_by_id() {
        let mut store = EntityStore::new();
        for id in [7, 3, 5] {
            store.upsert(EntityRef::message(id), message(id, 9, "x"));
        }
        store.upsert(EntityRef::message(4), message(4, 8, "elsewhere"));

        let ids: Vec<u64> = store
            .messages_in(EntityId::new(9))
            .iter()
            .map(|(id, _)| id.value())
            .collect();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn last_message_id_considers_channel_pointer() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::message(3), message(3, 9, "x"));
        let mut initial = channel(9);
        initial.insert(LAST_RECEIVED_MESSAGE.into(), Value::Object(message(6, 9, "y")));
        store.upsert(EntityRef::channel(9), initial);

        assert_eq!(store.last_message_id(EntityId::new(9)), Some(EntityId::new(6)));
        assert_eq!(store.last_message_id(EntityId::new(1)), None);
    }

    #[test]
    fn typed_view_decodes() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::message(1), message(1, 9, "hello"));

        let typed: Message = store.get_as(&EntityRef::message(1)).unwrap().unwrap();
        assert_eq!(typed.text(), Some("hello"));
        let entity = store.get_entity(&EntityRef::message(1)).unwrap().unwrap();
        assert_eq!(entity.entity_ref(), EntityRef::message(1));
        assert!(store.get_as::<Message>(&EntityRef::message(2)).unwrap().is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut store = EntityStore::new();
        store.upsert(EntityRef::user(1), object(json!({ "username": "ada" })));
        store.bind_capabilities(EntityRef::user(1), CapabilityBundle::new());
        store.clear();
        assert!(store.is_empty());
        assert!(store.capabilities(&EntityRef::user(1)).is_none());
    }
}
