//! Hypermedia resolver.
//!
//! Every payload from the server carries its own wiring: `relays`,
//! `actions`, `topics` and `streams`, each a map of name to URL. The
//! resolver strips those groups off, keeps them in the store's capability
//! side-table, and later turns a `(entity, kind, name)` lookup back into a
//! [`Request`]. It is the only place in the engine where URLs are read.
//!
//! Embedded entities (a channel's `lastReceivedMessage`, a notification's
//! `channel`, `message` and `parentMessage`) are bound under their own
//! identity as well, so the cache stays normalized.

use std::sync::Arc;

use hyperchat_core::{MergeOutcome, Record};
use hyperchat_types::{id_of, CapabilityBundle, CapabilityKind, EntityKind, EntityRef, TypesError};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ClientError;
use crate::shared::SharedStore;
use crate::transport::{Request, Transport};

/// A usable capability: a descriptor found in an entity's current bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Entity the descriptor belongs to.
    pub entity: EntityRef,
    /// Descriptor group.
    pub kind: CapabilityKind,
    /// Descriptor name.
    pub name: String,
    /// Target URL.
    pub url: String,
}

impl Capability {
    /// Build the pending request for this capability.
    pub fn request(&self, args: Value) -> Request {
        Request {
            kind: self.kind,
            name: self.name.clone(),
            url: self.url.clone(),
            args,
            cursor: None,
        }
    }
}

/// Resolves capabilities and executes them through the transport.
pub struct Resolver<T: Transport> {
    transport: Arc<T>,
    store: SharedStore,
}

impl<T: Transport> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            store: self.store.clone(),
        }
    }
}

impl<T: Transport> Resolver<T> {
    /// Create a resolver over a transport and a cache.
    pub fn new(transport: Arc<T>, store: SharedStore) -> Self {
        Self { transport, store }
    }

    /// The cache this resolver binds into.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Bind one raw entity payload: split its descriptors, normalize embedded
    /// entities, merge everything into the cache.
    pub fn bind(&self, kind: EntityKind, raw: Value) -> Result<EntityRef, ClientError> {
        bind_payload(&self.store, kind, raw)
    }

    /// Bind a response that is either one entity or an array of entities.
    pub fn bind_all(&self, kind: EntityKind, raw: Value) -> Result<Vec<EntityRef>, ClientError> {
        match raw {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.bind(kind, item))
                .collect(),
            object @ Value::Object(_) => Ok(vec![self.bind(kind, object)?]),
            other => Err(ClientError::Protocol(format!(
                "expected {} payload, got {}",
                kind, other
            ))),
        }
    }

    /// Look up a capability in the entity's current bundle.
    pub fn capability(
        &self,
        entity: &EntityRef,
        kind: CapabilityKind,
        name: &str,
    ) -> Result<Capability, ClientError> {
        let url = self
            .store
            .read(|store| {
                store
                    .capabilities(entity)
                    .and_then(|bundle| bundle.get(kind, name))
                    .map(str::to_string)
            })
            .ok_or_else(|| ClientError::CapabilityUnavailable {
                entity: *entity,
                kind,
                name: name.to_string(),
            })?;

        Ok(Capability {
            entity: *entity,
            kind,
            name: name.to_string(),
            url,
        })
    }

    /// Execute a request built from a capability.
    pub async fn execute(&self, request: Request) -> Result<Value, ClientError> {
        Ok(self.transport.call(request).await?)
    }

    /// Look up a capability and execute it.
    pub async fn invoke(
        &self,
        entity: &EntityRef,
        kind: CapabilityKind,
        name: &str,
        args: Value,
    ) -> Result<Value, ClientError> {
        let capability = self.capability(entity, kind, name)?;
        self.execute(capability.request(args)).await
    }

    /// Follow a relay and bind whatever it returns as `kind`.
    pub async fn fetch(
        &self,
        entity: &EntityRef,
        relay: &str,
        kind: EntityKind,
    ) -> Result<Vec<EntityRef>, ClientError> {
        let body = self
            .invoke(entity, CapabilityKind::Relay, relay, json!({}))
            .await?;
        self.bind_all(kind, body)
    }

    /// Fetch an entry point the host application knows the URL of.
    pub async fn load(&self, url: &str, kind: EntityKind) -> Result<Vec<EntityRef>, ClientError> {
        let request = Request {
            kind: CapabilityKind::Relay,
            name: "self".to_string(),
            url: url.to_string(),
            args: json!({}),
            cursor: None,
        };
        let body = self.execute(request).await?;
        self.bind_all(kind, body)
    }
}

/// One identity extracted from a payload.
struct Extracted {
    entity: EntityRef,
    record: Record,
    bundle: Option<CapabilityBundle>,
}

/// Bind a raw payload into the cache. Embedded entities are applied first.
pub(crate) fn bind_payload(
    store: &SharedStore,
    kind: EntityKind,
    raw: Value,
) -> Result<EntityRef, ClientError> {
    let mut extracted = Vec::new();
    let (entity, _) = extract(kind, raw, &mut extracted)?;

    store.write(|store| {
        for Extracted {
            entity,
            record,
            bundle,
        } in extracted
        {
            let outcome = store.upsert(entity, record);
            if outcome == MergeOutcome::StaleDiscarded {
                debug!("Discarded stale payload for {}", entity);
                continue;
            }
            if let Some(bundle) = bundle {
                store.bind_capabilities(entity, bundle);
            }
        }
    });

    Ok(entity)
}

/// Fields that embed another entity, per parent kind.
fn embedded_fields(kind: EntityKind) -> &'static [(&'static str, EntityKind)] {
    match kind {
        EntityKind::Channel => &[("lastReceivedMessage", EntityKind::Message)],
        EntityKind::Notification => &[
            ("channel", EntityKind::Channel),
            ("message", EntityKind::Message),
            ("parentMessage", EntityKind::Message),
        ],
        EntityKind::User | EntityKind::Message => &[],
    }
}

/// Split one payload (and, recursively, its embedded entities) into
/// records and bundles. Returns the payload's identity and its stripped record.
fn extract(
    kind: EntityKind,
    raw: Value,
    out: &mut Vec<Extracted>,
) -> Result<(EntityRef, Record), ClientError> {
    let Value::Object(mut object) = raw else {
        return Err(TypesError::InvalidPayload(format!("{} payload is not an object", kind)).into());
    };

    let carries_descriptors = [
        CapabilityKind::Relay,
        CapabilityKind::Action,
        CapabilityKind::Topic,
        CapabilityKind::Stream,
    ]
    .iter()
    .any(|group| object.contains_key(group.payload_key()));
    let bundle = CapabilityBundle::split_from(&mut object)?;

    let id = object
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| TypesError::InvalidPayload(format!("{} payload has no id", kind)))?;
    let entity = EntityRef::new(kind, id.into());

    for (field, child_kind) in embedded_fields(kind) {
        let Some(child) = object.get_mut(*field) else {
            continue;
        };
        if !child.is_object() || id_of(child).is_none() {
            continue;
        }
        let (_, stripped) = extract(*child_kind, child.take(), out)?;
        *child = Value::Object(stripped);
    }

    out.push(Extracted {
        entity,
        record: object.clone(),
        bundle: carries_descriptors.then_some(bundle),
    });
    Ok((entity, object))
}
