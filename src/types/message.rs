use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a client-issued provisional message id. A message keeps a
/// provisional id only while its durable write is in flight.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Reference to a post shared into a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPost {
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A single message within a conversation. All optional fields are declared
/// upfront and default to absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Id of the message this one replies to, within the same conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_post: Option<SharedPost>,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    /// Whether this message still carries a client-issued provisional id.
    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// Generates a fresh provisional message id, unique per pending send.
pub fn new_temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{:016x}", rand::random::<u64>())
}
