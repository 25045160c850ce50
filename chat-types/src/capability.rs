//! Hypermedia descriptor bundles.
//!
//! Every entity payload carries four descriptor groups next to its domain
//! fields:
//!
//! ```json
//! {
//!   "id": 7, "type": "Public", "name": "general",
//!   "relays":  { "self": "https://chat.example/c/7" },
//!   "actions": { "join": "https://chat.example/c/7/join" },
//!   "topics":  { "messages": "wss://chat.example/t/c7/messages" },
//!   "streams": { "messages": "https://chat.example/c/7/messages" }
//! }
//! ```
//!
//! The descriptors are transport wiring, not domain state. They are split off
//! into a [`CapabilityBundle`] before the domain fields reach the cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::TypesError;

/// The four descriptor groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityKind {
    /// Fetch this entity or a related collection.
    Relay,
    /// Named mutating operation.
    Action,
    /// Subscribable real-time feed.
    Topic,
    /// Paginated collection.
    Stream,
}

impl CapabilityKind {
    /// The payload key that holds this group.
    pub fn payload_key(&self) -> &'static str {
        match self {
            CapabilityKind::Relay => "relays",
            CapabilityKind::Action => "actions",
            CapabilityKind::Topic => "topics",
            CapabilityKind::Stream => "streams",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::Relay => "relay",
            CapabilityKind::Action => "action",
            CapabilityKind::Topic => "topic",
            CapabilityKind::Stream => "stream",
        };
        f.write_str(name)
    }
}

/// Descriptor groups of one entity, name → URL.
///
/// Absence of a name means the operation is not available to the current
/// viewer; it is never a transport failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityBundle {
    /// Relay links.
    #[serde(default)]
    pub relays: BTreeMap<String, String>,
    /// Action links.
    #[serde(default)]
    pub actions: BTreeMap<String, String>,
    /// Topic links.
    #[serde(default)]
    pub topics: BTreeMap<String, String>,
    /// Stream links.
    #[serde(default)]
    pub streams: BTreeMap<String, String>,
}

impl CapabilityBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, kind: CapabilityKind) -> &BTreeMap<String, String> {
        match kind {
            CapabilityKind::Relay => &self.relays,
            CapabilityKind::Action => &self.actions,
            CapabilityKind::Topic => &self.topics,
            CapabilityKind::Stream => &self.streams,
        }
    }

    fn group_mut(&mut self, kind: CapabilityKind) -> &mut BTreeMap<String, String> {
        match kind {
            CapabilityKind::Relay => &mut self.relays,
            CapabilityKind::Action => &mut self.actions,
            CapabilityKind::Topic => &mut self.topics,
            CapabilityKind::Stream => &mut self.streams,
        }
    }

    /// Look up the URL of a named capability.
    pub fn get(&self, kind: CapabilityKind, name: &str) -> Option<&str> {
        self.group(kind).get(name).map(String::as_str)
    }

    /// Check whether a named capability is present.
    pub fn has(&self, kind: CapabilityKind, name: &str) -> bool {
        self.group(kind).contains_key(name)
    }

    /// Names available in one group.
    pub fn names(&self, kind: CapabilityKind) -> impl Iterator<Item = &str> {
        self.group(kind).keys().map(String::as_str)
    }

    /// Add a capability (builder style, mostly for tests and fixtures).
    pub fn with(mut self, kind: CapabilityKind, name: &str, url: &str) -> Self {
        self.group_mut(kind).insert(name.to_string(), url.to_string());
        self
    }

    /// True if no group carries any descriptor.
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
            && self.actions.is_empty()
            && self.topics.is_empty()
            && self.streams.is_empty()
    }

    /// Remove the descriptor groups from a raw payload object and return them.
    ///
    /// The object is left holding only domain fields. Groups that are not
    /// objects of strings are rejected.
    pub fn split_from(object: &mut Map<String, Value>) -> Result<Self, TypesError> {
        let mut bundle = Self::new();
        for kind in [
            CapabilityKind::Relay,
            CapabilityKind::Action,
            CapabilityKind::Topic,
            CapabilityKind::Stream,
        ] {
            let Some(raw) = object.remove(kind.payload_key()) else {
                continue;
            };
            match raw {
                Value::Null => {}
                Value::Object(entries) => {
                    let group = bundle.group_mut(kind);
                    for (name, url) in entries {
                        match url {
                            Value::String(url) => {
                                group.insert(name, url);
                            }
                            // a null descriptor is the server withdrawing it
                            Value::Null => {}
                            other => {
                                return Err(TypesError::InvalidPayload(format!(
                                    "{} descriptor '{}' is not a string: {}",
                                    kind, name, other
                                )))
                            }
                        }
                    }
                }
                other => {
                    return Err(TypesError::InvalidPayload(format!(
                        "'{}' is not an object: {}",
                        kind.payload_key(),
                        other
                    )))
                }
            }
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_removes_descriptor_groups() {
        let mut raw = json!({
            "id": 7,
            "type": "Public",
            "relays": { "self": "https://chat.example/c/7" },
            "actions": { "join": "https://chat.example/c/7/join" },
            "topics": { "messages": "wss://chat.example/t/c7/messages" },
            "streams": { "messages": "https://chat.example/c/7/messages" }
        });
        let object = raw.as_object_mut().unwrap();

        let bundle = CapabilityBundle::split_from(object).unwrap();

        assert_eq!(object.len(), 2);
        assert!(object.contains_key("id"));
        assert_eq!(
            bundle.get(CapabilityKind::Action, "join"),
            Some("https://chat.example/c/7/join")
        );
        assert!(bundle.has(CapabilityKind::Topic, "messages"));
        assert!(bundle.has(CapabilityKind::Stream, "messages"));
        assert!(!bundle.has(CapabilityKind::Action, "leave"));
    }

    #[test]
    fn split_without_descriptors_is_empty() {
        let mut raw = json!({ "id": 1, "username": "ada" });
        let bundle = CapabilityBundle::split_from(raw.as_object_mut().unwrap()).unwrap();
        assert!(bundle.is_empty());
    }

    #[test]
    fn null_descriptor_is_withdrawn() {
        let mut raw = json!({ "id": 1, "actions": { "mute": null, "leave": "https://x/leave" } });
        let bundle = CapabilityBundle::split_from(raw.as_object_mut().unwrap()).unwrap();
        assert!(!bundle.has(CapabilityKind::Action, "mute"));
        assert!(bundle.has(CapabilityKind::Action, "leave"));
    }

    #[test]
    fn non_string_descriptor_is_rejected() {
        let mut raw = json!({ "id": 1, "actions": { "mute": 5 } });
        let result = CapabilityBundle::split_from(raw.as_object_mut().unwrap());
        assert!(matches!(result, Err(TypesError::InvalidPayload(_))));
    }

    #[test]
    fn names_lists_one_group() {
        let bundle = CapabilityBundle::new()
            .with(CapabilityKind::Action, "read", "https://x/read")
            .with(CapabilityKind::Action, "edit", "https://x/edit")
            .with(CapabilityKind::Relay, "self", "https://x");
        let names: Vec<&str> = bundle.names(CapabilityKind::Action).collect();
        assert_eq!(names, vec!["edit", "read"]);
    }
}
