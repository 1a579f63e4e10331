//! Online-presence tracking for peers, fed by realtime channel events and
//! app-visibility signals.

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::client::Client;
use crate::types::presence::Presence;
use crate::types::wire::{EVT_USER_ACTIVE, EVT_USER_INACTIVE};

/// Answers "is peer X online" and "when was peer X last seen". No
/// persistence; reset to empty on reconnect until the next snapshot.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<String>,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the online set from an `onlineUsers` snapshot.
    pub fn set_online(&mut self, ids: impl IntoIterator<Item = String>) {
        self.online = ids.into_iter().collect();
        for id in &self.online {
            self.last_seen.remove(id);
        }
    }

    pub fn mark_connected(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.last_seen.remove(&id);
        self.online.insert(id);
    }

    pub fn mark_disconnected(&mut self, id: impl Into<String>, at: Option<DateTime<Utc>>) {
        let id = id.into();
        self.online.remove(&id);
        if let Some(at) = at {
            self.last_seen.insert(id, at);
        }
    }

    pub fn is_online(&self, id: &str) -> bool {
        self.online.contains(id)
    }

    /// Last-seen timestamp for a peer. Online supersedes last-seen: this
    /// never returns a value for an id in the online set.
    pub fn last_seen(&self, id: &str) -> Option<DateTime<Utc>> {
        if self.online.contains(id) {
            return None;
        }
        self.last_seen.get(id).copied()
    }

    /// Clears all state, used when a connection is torn down.
    pub fn reset(&mut self) {
        self.online.clear();
        self.last_seen.clear();
    }
}

impl Client {
    /// Sends an outbound presence ping reflecting app visibility. Channel
    /// errors are logged and otherwise ignored.
    pub async fn send_presence(&self, presence: Presence) {
        let event = match presence {
            Presence::Active => EVT_USER_ACTIVE,
            Presence::Inactive => EVT_USER_INACTIVE,
        };
        if let Err(e) = self.send_event(event, serde_json::json!({})).await {
            debug!(target: "Client/Presence", "Presence ping '{event}' not delivered: {e}");
        }
    }

    /// App visibility changed; forward it as a presence ping.
    pub async fn set_app_active(self: &Arc<Self>, active: bool) {
        let presence = if active {
            Presence::Active
        } else {
            Presence::Inactive
        };
        self.send_presence(presence).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn online_supersedes_last_seen() {
        let mut tracker = PresenceTracker::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        tracker.mark_disconnected("u1", Some(at));
        assert_eq!(tracker.last_seen("u1"), Some(at));

        tracker.mark_connected("u1");
        assert!(tracker.is_online("u1"));
        assert_eq!(tracker.last_seen("u1"), None);
    }

    #[test]
    fn disconnect_then_reconnect_ends_online() {
        let mut tracker = PresenceTracker::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        tracker.mark_disconnected("u1", Some(at));
        tracker.mark_connected("u1");

        assert!(tracker.is_online("u1"));
        assert_eq!(tracker.last_seen("u1"), None);
    }

    #[test]
    fn snapshot_replaces_previous_online_set() {
        let mut tracker = PresenceTracker::new();
        tracker.mark_connected("u1");
        tracker.set_online(vec!["u2".to_string(), "u3".to_string()]);

        assert!(!tracker.is_online("u1"));
        assert!(tracker.is_online("u2"));
        assert!(tracker.is_online("u3"));
    }

    #[test]
    fn snapshot_clears_stale_last_seen_for_online_ids() {
        let mut tracker = PresenceTracker::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        tracker.mark_disconnected("u1", Some(at));

        tracker.set_online(vec!["u1".to_string()]);
        assert!(tracker.is_online("u1"));
        assert_eq!(tracker.last_seen("u1"), None);

        // Drops out of the next snapshot without an explicit disconnect:
        // no fabricated last-seen value.
        tracker.set_online(Vec::new());
        assert!(!tracker.is_online("u1"));
        assert_eq!(tracker.last_seen("u1"), None);
    }

    #[test]
    fn reset_clears_everything() {
        let mut tracker = PresenceTracker::new();
        tracker.mark_connected("u1");
        tracker.mark_disconnected("u2", Some(Utc::now()));
        tracker.reset();
        assert!(!tracker.is_online("u1"));
        assert_eq!(tracker.last_seen("u2"), None);
    }
}
