//! Optimistic patches for mutating actions.
//!
//! Given the cached record of an entity and an action about to be sent, this
//! module computes the local patch to apply before the server answers, and
//! what to do with the entity once the server confirms. Pure functions, no
//! I/O: the dispatcher in `hyperchat-client` applies and reverts the patches.

use hyperchat_types::{EntityId, EntityKind, ReactionSummary};
use serde_json::{json, Map, Value};

use crate::store::Record;

/// What happens to the entity after the server confirms an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterConfirm {
    /// Merge the response, keep the entity.
    Keep,
    /// Evict the entity (and its dependents).
    Evict,
}

/// Post-confirmation effect of an action.
pub fn after_confirm(kind: EntityKind, action: &str) -> AfterConfirm {
    match (kind, action) {
        (EntityKind::Channel, "leave" | "hide" | "delete") => AfterConfirm::Evict,
        (EntityKind::Message, "delete") => AfterConfirm::Evict,
        _ => AfterConfirm::Keep,
    }
}

/// Compute the optimistic patch for an action.
///
/// Returns `None` when the action has no local effect (the server assigns
/// what changes, e.g. a reply's id) or the entity is not cached. `viewer` is
/// needed for reaction changes; without it reactions wait for the server.
pub fn optimistic_patch(
    kind: EntityKind,
    action: &str,
    args: &Value,
    current: Option<&Record>,
    viewer: Option<EntityId>,
) -> Option<Record> {
    let current = current?;
    let patch = match (kind, action) {
        (EntityKind::Message, "read") => json!({ "read": true }),
        (EntityKind::Message, "unread") => json!({ "read": false }),
        (EntityKind::Message, "edit") => json!({ "text": args.get("text")?.as_str()? }),
        (EntityKind::Message, "delete") => json!({ "deleted": true }),
        (EntityKind::Message, "updateProperties") => {
            json!({ "properties": args.get("properties")?.clone() })
        }
        (EntityKind::Message, "react") => {
            let emoji = args.get("emoji")?.as_str()?;
            json!({ "reactions": with_reaction(current, emoji, viewer?) })
        }
        (EntityKind::Message, "removeReaction") => {
            let emoji = args.get("emoji")?.as_str()?;
            json!({ "reactions": without_reaction(current, emoji, viewer?) })
        }
        (EntityKind::Channel, "mute") => {
            let muted = args.get("muted").and_then(Value::as_bool).unwrap_or(true);
            json!({ "muted": muted })
        }
        (EntityKind::Channel, "join") => json!({ "joined": true }),
        (EntityKind::Channel, "leave") => json!({ "joined": false }),
        (EntityKind::Channel, "hide") => json!({ "hidden": true }),
        (EntityKind::Channel, "update") => {
            let mut patch = Map::new();
            for key in ["name", "description", "properties"] {
                if let Some(value) = args.get(key) {
                    patch.insert(key.to_string(), value.clone());
                }
            }
            if patch.is_empty() {
                return None;
            }
            Value::Object(patch)
        }
        _ => return None,
    };

    match patch {
        Value::Object(patch) => Some(patch),
        _ => None,
    }
}

fn reactions_of(record: &Record) -> Vec<ReactionSummary> {
    record
        .get("reactions")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

fn with_reaction(record: &Record, emoji: &str, viewer: EntityId) -> Vec<ReactionSummary> {
    let mut reactions = reactions_of(record);
    match reactions.iter_mut().find(|r| r.emoji == emoji) {
        Some(summary) => {
            if !summary.user_ids.contains(&viewer) {
                summary.user_ids.push(viewer);
            }
        }
        None => reactions.push(ReactionSummary {
            emoji: emoji.to_string(),
            user_ids: vec![viewer],
        }),
    }
    reactions
}

fn without_reaction(record: &Record, emoji: &str, viewer: EntityId) -> Vec<ReactionSummary> {
    let mut reactions = reactions_of(record);
    for summary in reactions.iter_mut().filter(|r| r.emoji == emoji) {
        summary.user_ids.retain(|user| *user != viewer);
    }
    reactions.retain(|r| !r.user_ids.is_empty());
    reactions
}
