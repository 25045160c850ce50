//! Optimistic action dispatcher.
//!
//! A dispatch runs in six steps:
//!
//! 1. Look up the action in the entity's bundle (missing: fail, touch nothing)
//! 2. Wait for the entity's turn (actions on one entity run in submission order)
//! 3. Snapshot the entity and apply the optimistic patch
//! 4. Invoke the action
//! 5. On success, merge the response and apply post-action effects
//! 6. On failure, revert the fields the patch set (unless something else
//!    wrote them since) and report `ActionFailed`
//!
//! Failed actions are never retried.

use std::sync::Arc;

use dashmap::DashMap;
use hyperchat_core::{after_confirm, optimistic_patch, AfterConfirm};
use hyperchat_types::{CapabilityKind, EntityId, EntityRef};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::resolver::Resolver;
use crate::transport::Transport;

/// Applies actions optimistically and reconciles with the server.
pub struct Dispatcher<T: Transport> {
    resolver: Resolver<T>,
    viewer: Option<EntityId>,
    /// Per-entity FIFO gates. tokio's mutex queues waiters fairly.
    gates: Arc<DashMap<EntityRef, Arc<Mutex<()>>>>,
}

impl<T: Transport> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            viewer: self.viewer,
            gates: Arc::clone(&self.gates),
        }
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Create a dispatcher. `viewer` is needed for optimistic reactions.
    pub fn new(resolver: Resolver<T>, viewer: Option<EntityId>) -> Self {
        Self {
            resolver,
            viewer,
            gates: Arc::new(DashMap::new()),
        }
    }

    /// Dispatch an action on an entity.
    ///
    /// Returns the entity bound from the server's response, if it sent one
    /// and the entity was not evicted as a consequence of the action.
    pub async fn dispatch(
        &self,
        entity: EntityRef,
        action: &str,
        args: Value,
    ) -> Result<Option<EntityRef>, ClientError> {
        // Fail fast, before queueing behind other actions
        self.resolver
            .capability(&entity, CapabilityKind::Action, action)?;

        let gate = Arc::clone(self.gates.entry(entity).or_default().value());
        let result = {
            let _turn = gate.lock().await;
            self.run(entity, action, args).await
        };
        drop(gate);
        self.gates
            .remove_if(&entity, |_, gate| Arc::strong_count(gate) == 1);

        result
    }

    async fn run(
        &self,
        entity: EntityRef,
        action: &str,
        args: Value,
    ) -> Result<Option<EntityRef>, ClientError> {
        // A previous action may have withdrawn it
        let capability = self
            .resolver
            .capability(&entity, CapabilityKind::Action, action)?;

        let store = self.resolver.store();
        let (snapshot, applied) = store.write(|store| {
            let snapshot = store.snapshot(&entity);
            let patch = optimistic_patch(entity.kind, action, &args, snapshot.record(), self.viewer);
            if let Some(patch) = &patch {
                store.upsert(entity, patch.clone());
            }
            (snapshot, patch)
        });
        let rollback = || {
            if let Some(patch) = &applied {
                store.write(|store| store.revert(&entity, &snapshot, patch));
            }
        };

        let body = match self.resolver.execute(capability.request(args)).await {
            Ok(body) => body,
            Err(ClientError::Transport(source)) => {
                debug!("Rolling back '{}' on {}: {}", action, entity, source);
                rollback();
                return Err(ClientError::ActionFailed {
                    action: action.to_string(),
                    source,
                });
            }
            Err(other) => {
                rollback();
                return Err(other);
            }
        };

        let bound = if body.get("id").is_some() {
            match self.resolver.bind(entity.kind, body) {
                Ok(bound) => Some(bound),
                Err(e) => {
                    warn!("Ignoring unusable response to '{}' on {}: {}", action, entity, e);
                    None
                }
            }
        } else {
            None
        };

        match after_confirm(entity.kind, action) {
            AfterConfirm::Evict => {
                let evicted = store.evict(&entity);
                debug!("'{}' evicted {} entities", action, evicted.len());
                Ok(bound.filter(|bound| !evicted.contains(bound)))
            }
            AfterConfirm::Keep => Ok(bound),
        }
    }

    /// Number of entities with an action queued or in flight.
    pub fn in_flight(&self) -> usize {
        self.gates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthStrategy;
    use crate::router::{RouteOutcome, Router};
    use crate::shared::SharedStore;
    use crate::transport::{MockTransport, TransportError};
    use hyperchat_types::{Channel, EntityKind, Envelope, Message};
    use serde_json::json;
    use std::time::Duration;

    const EDIT: &str = "https://chat.example/m/1/edit";
    const REACT: &str = "https://chat.example/m/1/react";
    const DELETE: &str = "https://chat.example/m/1/delete";
    const LEAVE: &str = "https://chat.example/c/9/leave";

    struct Fixture {
        dispatcher: Dispatcher<MockTransport>,
        transport: MockTransport,
        store: SharedStore,
    }

    async fn fixture() -> Fixture {
        let transport = MockTransport::new();
        transport.connect(&AuthStrategy::Unsecured).await.unwrap();
        let store = SharedStore::new();
        let resolver = Resolver::new(Arc::new(transport.clone()), store.clone());
        resolver
            .bind(
                EntityKind::Channel,
                json!({
                    "id": 9,
                    "type": "Public",
                    "name": "general",
                    "joined": true,
                    "actions": { "leave": LEAVE }
                }),
            )
            .unwrap();
        resolver
            .bind(
                EntityKind::Message,
                json!({
                    "id": 1,
                    "channelId": 9,
                    "type": "UserText",
                    "authorId": 3,
                    "text": "original",
                    "reactions": [{ "emoji": "👍", "userIds": [4] }],
                    "actions": { "edit": EDIT, "react": REACT, "delete": DELETE }
                }),
            )
            .unwrap();
        Fixture {
            dispatcher: Dispatcher::new(resolver, Some(EntityId::new(7))),
            transport,
            store,
        }
    }

    fn text_of(store: &SharedStore, id: u64) -> String {
        let message: Message = store.get_as(&EntityRef::message(id)).unwrap().unwrap();
        message.text().unwrap().to_string()
    }

    // ===========================================
    // Capability Gating Tests
    // ===========================================

    #[tokio::test]
    async fn missing_action_fails_without_mutation() {
        let f = fixture().await;
        let before = f.store.read(|s| s.get(&EntityRef::channel(9)).cloned());

        let result = f
            .dispatcher
            .dispatch(EntityRef::channel(9), "join", json!({}))
            .await;

        assert!(matches!(
            result,
            Err(ClientError::CapabilityUnavailable { ref name, .. }) if name == "join"
        ));
        assert!(f.transport.calls().is_empty());
        assert_eq!(f.store.read(|s| s.get(&EntityRef::channel(9)).cloned()), before);
    }

    // ===========================================
    // Optimistic Apply / Reconcile Tests
    // ===========================================

    #[tokio::test]
    async fn optimistic_patch_visible_while_in_flight() {
        let f = fixture().await;
        f.transport.queue_delayed_response(
            EDIT,
            json!({ "id": 1, "channelId": 9, "type": "UserText", "authorId": 3, "text": "server", "editedTime": "t1" }),
            Duration::from_millis(50),
        );

        let dispatcher = f.dispatcher.clone();
        let task = tokio::spawn(async move {
            dispatcher
                .dispatch(EntityRef::message(1), "edit", json!({ "text": "local" }))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(text_of(&f.store, 1), "local");

        let bound = task.await.unwrap().unwrap();
        assert_eq!(bound, Some(EntityRef::message(1)));
        assert_eq!(text_of(&f.store, 1), "server");
    }

    #[tokio::test]
    async fn react_applies_viewer_reaction() {
        let f = fixture().await;
        f.transport.queue_response(REACT, json!({ "ok": true }));

        let bound = f
            .dispatcher
            .dispatch(EntityRef::message(1), "react", json!({ "emoji": "👍" }))
            .await
            .unwrap();

        assert_eq!(bound, None);
        let message: Message = f.store.get_as(&EntityRef::message(1)).unwrap().unwrap();
        assert_eq!(
            message.reactions[0].user_ids,
            vec![EntityId::new(4), EntityId::new(7)]
        );
    }

    // ===========================================
    // Rollback Tests
    // ===========================================

    #[tokio::test]
    async fn failed_edit_rolls_back_exactly() {
        let f = fixture().await;
        let before = f.store.read(|s| s.get(&EntityRef::message(1)).cloned());
        let bundle_before = f.store.capabilities(&EntityRef::message(1));
        f.transport.queue_error(
            EDIT,
            TransportError::RequestFailed {
                status: 403,
                message: "forbidden".into(),
            },
        );

        let result = f
            .dispatcher
            .dispatch(EntityRef::message(1), "edit", json!({ "text": "local" }))
            .await;

        match result {
            Err(ClientError::ActionFailed { action, source }) => {
                assert_eq!(action, "edit");
                assert!(matches!(source, TransportError::RequestFailed { status: 403, .. }));
            }
            other => panic!("Expected ActionFailed, got {:?}", other),
        }
        assert_eq!(f.store.read(|s| s.get(&EntityRef::message(1)).cloned()), before);
        assert_eq!(f.store.capabilities(&EntityRef::message(1)), bundle_before);
    }

    #[tokio::test]
    async fn rollback_keeps_events_applied_while_in_flight() {
        let f = fixture().await;
        let router = Router::new(f.store.clone(), None);
        f.transport
            .queue_delayed_error(EDIT, TransportError::Timeout, Duration::from_millis(30));

        let edit = f
            .dispatcher
            .dispatch(EntityRef::message(1), "edit", json!({ "text": "local" }));
        let inbound = async {
            assert_eq!(text_of(&f.store, 1), "local");
            router.on_envelope(&Envelope::new(
                "reactionChanged",
                json!({ "messageId": 1, "reactions": [{ "emoji": "👍", "userIds": [5] }] }),
            ))
        };
        let (result, routed) = tokio::join!(edit, inbound);

        assert!(matches!(result, Err(ClientError::ActionFailed { .. })));
        assert_eq!(routed, RouteOutcome::Applied(vec![EntityRef::message(1)]));
        let message: Message = f.store.get_as(&EntityRef::message(1)).unwrap().unwrap();
        assert_eq!(message.text(), Some("original"));
        assert_eq!(message.reactions.len(), 1);
        assert_eq!(message.reactions[0].user_ids, vec![EntityId::new(5)]);
    }

    #[tokio::test]
    async fn failed_action_is_not_retried() {
        let f = fixture().await;
        f.transport.queue_error(EDIT, TransportError::Timeout);

        let _ = f
            .dispatcher
            .dispatch(EntityRef::message(1), "edit", json!({ "text": "x" }))
            .await;

        assert_eq!(f.transport.calls_to(EDIT).len(), 1);
    }

    // ===========================================
    // Serialization Tests
    // ===========================================

    #[tokio::test]
    async fn same_entity_actions_run_in_submission_order() {
        let f = fixture().await;
        // First response is slow; a concurrent runner would finish the second first
        f.transport.queue_delayed_response(
            EDIT,
            json!({ "id": 1, "channelId": 9, "type": "UserText", "authorId": 3, "text": "first" }),
            Duration::from_millis(50),
        );
        f.transport.queue_response(
            EDIT,
            json!({ "id": 1, "channelId": 9, "type": "UserText", "authorId": 3, "text": "second" }),
        );

        let first = f
            .dispatcher
            .dispatch(EntityRef::message(1), "edit", json!({ "text": "first" }));
        let second = f
            .dispatcher
            .dispatch(EntityRef::message(1), "edit", json!({ "text": "second" }));
        let (a, b) = tokio::join!(first, second);
        a.unwrap();
        b.unwrap();

        let calls = f.transport.calls_to(EDIT);
        assert_eq!(calls[0].args["text"], "first");
        assert_eq!(calls[1].args["text"], "second");
        assert_eq!(text_of(&f.store, 1), "second");
        assert_eq!(f.dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn failure_does_not_clobber_later_action() {
        let f = fixture().await;
        f.transport
            .queue_delayed_error(EDIT, TransportError::Timeout, Duration::from_millis(30));
        f.transport.queue_response(EDIT, json!({ "ok": true }));

        let first = f
            .dispatcher
            .dispatch(EntityRef::message(1), "edit", json!({ "text": "lost" }));
        let second = f
            .dispatcher
            .dispatch(EntityRef::message(1), "edit", json!({ "text": "kept" }));
        let (a, b) = tokio::join!(first, second);

        assert!(a.is_err());
        assert!(b.is_ok());
        assert_eq!(text_of(&f.store, 1), "kept");
    }

    // ===========================================
    // Post-Action Effect Tests
    // ===========================================

    #[tokio::test]
    async fn leave_evicts_channel_and_messages() {
        let f = fixture().await;
        f.transport.queue_response(LEAVE, json!({ "ok": true }));

        f.dispatcher
            .dispatch(EntityRef::channel(9), "leave", json!({}))
            .await
            .unwrap();

        assert!(!f.store.contains(&EntityRef::channel(9)));
        assert!(!f.store.contains(&EntityRef::message(1)));
        assert!(f.store.capabilities(&EntityRef::channel(9)).is_none());
    }

    #[tokio::test]
    async fn failed_leave_keeps_membership() {
        let f = fixture().await;
        f.transport.queue_error(LEAVE, TransportError::Timeout);

        let result = f
            .dispatcher
            .dispatch(EntityRef::channel(9), "leave", json!({}))
            .await;

        assert!(result.is_err());
        let channel: Channel = f.store.get_as(&EntityRef::channel(9)).unwrap().unwrap();
        assert!(channel.joined);
    }

    #[tokio::test]
    async fn delete_evicts_message() {
        let f = fixture().await;
        f.transport.queue_response(DELETE, json!({}));

        let bound = f
            .dispatcher
            .dispatch(EntityRef::message(1), "delete", json!({}))
            .await
            .unwrap();

        assert_eq!(bound, None);
        assert!(!f.store.contains(&EntityRef::message(1)));
        assert!(f.store.contains(&EntityRef::channel(9)));
    }
}
