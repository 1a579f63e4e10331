use std::sync::Arc;
use tokio::sync::broadcast;

use super::message::Message;
use super::presence::PresenceUpdate;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// The realtime channel connected and identified.
#[derive(Debug, Clone)]
pub struct Connected;

/// The realtime channel was lost. The polling fallback keeps the store
/// converging until the channel is re-established.
#[derive(Debug, Clone)]
pub struct Disconnected;

/// The whole conversation list was replaced by a server fetch.
#[derive(Debug, Clone)]
pub struct ConversationsReplaced {
    pub count: usize,
}

/// A single conversation was refreshed in place by the polling fallback.
#[derive(Debug, Clone)]
pub struct ConversationRefreshed {
    pub conversation_id: String,
}

/// A message was appended or updated in a conversation.
#[derive(Debug, Clone)]
pub struct MessageUpserted {
    pub conversation_id: String,
    pub message: Message,
}

/// A message was removed from a conversation.
#[derive(Debug, Clone)]
pub struct MessageRemoved {
    pub conversation_id: String,
    pub message_id: String,
}

/// A conversation was marked read, either locally (`by_peer == false`) or
/// by a remote read receipt.
#[derive(Debug, Clone)]
pub struct ConversationRead {
    pub conversation_id: String,
    pub by_peer: bool,
}

/// Non-blocking warning: a send's durable write failed after the optimistic
/// entry was applied. The entry is retained and a refresh is scheduled.
#[derive(Debug, Clone)]
pub struct SendWarning {
    pub conversation_id: String,
    pub temp_id: String,
    pub reason: String,
}

/// A recoverable synchronization error surfaced to the UI.
#[derive(Debug, Clone)]
pub struct SyncError {
    pub context: &'static str,
    pub detail: String,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event type.
        /// The UI reads the store and subscribes here for deltas.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),

    // Store events
    (conversations_replaced, Arc<ConversationsReplaced>),
    (conversation_refreshed, Arc<ConversationRefreshed>),
    (message_upserted, Arc<MessageUpserted>),
    (message_removed, Arc<MessageRemoved>),
    (conversation_read, Arc<ConversationRead>),

    // Presence events
    (presence, Arc<PresenceUpdate>),

    // Error events
    (send_warning, Arc<SendWarning>),
    (sync_error, Arc<SyncError>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
