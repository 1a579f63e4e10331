//! Wire format of the realtime channel: JSON text frames carrying a
//! structured event name plus payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;

/// A single frame on the realtime channel, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_value(data)?,
        })
    }
}

// Inbound event names.
pub const EVT_NEW_MESSAGE: &str = "newMessage";
pub const EVT_MESSAGE_DELETED: &str = "messageDeleted";
pub const EVT_ONLINE_USERS: &str = "onlineUsers";
pub const EVT_USER_CONNECTED: &str = "userConnected";
pub const EVT_USER_DISCONNECTED: &str = "userDisconnected";
pub const EVT_MESSAGE_READ: &str = "messageRead";

// Outbound event names.
pub const EVT_IDENTIFY: &str = "identify";
pub const EVT_USER_ACTIVE: &str = "userActive";
pub const EVT_USER_INACTIVE: &str = "userInactive";
pub const EVT_MARK_READ: &str = "markRead";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub conversation_id: String,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    pub conversation_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConnectedPayload {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDisconnectedPayload {
    pub user_id: String,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

/// The contract tolerates marking every unread message in the conversation
/// read, so `message_id` is advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub conversation_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyPayload {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadPayload {
    pub conversation_id: String,
}
