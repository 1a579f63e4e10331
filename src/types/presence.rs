use chrono::{DateTime, Utc};

/// Outbound presence signal, driven by app visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Active,
    Inactive,
}

/// A change in a peer's presence, published on the event bus.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceUpdate {
    pub user_id: String,
    pub online: bool,
    /// Set only on transition to offline.
    pub last_seen: Option<DateTime<Utc>>,
}
