//! Per-channel message cursors.
//!
//! Message ids are assigned by the server and grow monotonically, so the
//! highest id seen on a channel is a complete description of "what we have".
//! After a disconnect the client asks for every message after that id; push
//! delivery during the outage is lost, not queued.
//!
//! Ids are global across channels, so gaps between consecutive ids of one
//! channel are normal and are not tracked.

use std::collections::BTreeMap;
use hyperchat_types::EntityId;

/// Highest message id seen per channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelCursors {
    last_seen: BTreeMap<EntityId, EntityId>,
}

impl ChannelCursors {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a message was observed on a channel.
    ///
    /// Returns true if this advanced the channel's cursor. Older and
    /// duplicate ids are ignored.
    pub fn observe(&mut self, channel: EntityId, message: EntityId) -> bool {
        match self.last_seen.get(&channel) {
            Some(last) if *last >= message => false,
            _ => {
                self.last_seen.insert(channel, message);
                true
            }
        }
    }

    /// Last message id seen on a channel.
    pub fn last_known(&self, channel: EntityId) -> Option<EntityId> {
        self.last_seen.get(&channel).copied()
    }

    /// Stop tracking a channel (it was evicted).
    pub fn forget(&mut self, channel: EntityId) {
        self.last_seen.remove(&channel);
    }

    /// Channels currently tracked.
    pub fn channels(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.last_seen.keys().copied()
    }

    /// Drop all cursors.
    pub fn clear(&mut self) {
        self.last_seen.clear();
    }
}
