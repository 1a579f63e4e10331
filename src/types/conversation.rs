use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;

/// The other participant of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Denormalized preview of the most recent message, used for list sorting
/// and previews. Always mirrors the tail of `messages` after any mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A conversation with a single peer. Message order is append order, which
/// is chronological.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub peer: Peer,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
}

impl Conversation {
    /// Recomputes `last_message` from the tail of `messages`.
    pub(crate) fn refresh_last_message(&mut self) {
        self.last_message = self.messages.last().map(|m| LastMessage {
            text: m.text.clone(),
            timestamp: m.timestamp,
        });
    }

    /// Whether the conversation holds at least one unread message not
    /// authored by `user_id`.
    pub fn has_unread_for(&self, user_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| !m.read && m.sender_id != user_id)
    }
}
