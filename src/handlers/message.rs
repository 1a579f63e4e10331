use super::traits::EventHandler;
use crate::client::Client;
use crate::store::UpsertOutcome;
use crate::types::events::MessageUpserted;
use crate::types::wire::{
    EVT_MESSAGE_DELETED, EVT_NEW_MESSAGE, MessageDeletedPayload, NewMessagePayload,
};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

/// Handler for `newMessage` events.
///
/// Upserts the message into the store, reorders the conversation to the
/// top, and drives pending-deletion reconciliation. A message for a
/// conversation unknown locally triggers a full list refresh instead of
/// fabricating a conversation.
pub struct NewMessageHandler;

#[async_trait]
impl EventHandler for NewMessageHandler {
    fn event(&self) -> &'static str {
        EVT_NEW_MESSAGE
    }

    async fn handle(&self, client: Arc<Client>, data: serde_json::Value) {
        let payload: NewMessagePayload = match serde_json::from_value(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "Client", "Malformed newMessage payload: {e}");
                return;
            }
        };
        let NewMessagePayload {
            conversation_id,
            message,
        } = payload;

        let outcome = {
            let mut store = client.store.write().await;
            let outcome = store.upsert_message(&conversation_id, message.clone());
            if outcome != UpsertOutcome::UnknownConversation {
                store.reorder_to_top(&conversation_id);
            }
            outcome
        };

        if outcome == UpsertOutcome::UnknownConversation {
            info!(
                target: "Client",
                "Message for unknown conversation {conversation_id}; refreshing list"
            );
            if let Err(e) = client.refresh_conversations().await {
                warn!(target: "Client", "Refresh after unknown conversation failed: {e}");
                client.emit_sync_error("conversation list fetch", e.to_string());
            }
            return;
        }

        let _ = client.event_bus.message_upserted.send(Arc::new(MessageUpserted {
            conversation_id: conversation_id.clone(),
            message: message.clone(),
        }));

        // A send confirmed through the channel may unblock a deletion that
        // was requested while the message was still provisional.
        client.flush_pending_deletions(&conversation_id).await;

        // Reading the active conversation live: acknowledge straight away.
        let is_active = {
            let store = client.store.read().await;
            store.active() == Some(conversation_id.as_str())
        };
        if is_active && message.sender_id != client.config.user_id {
            client.store.write().await.mark_read(&conversation_id);
            client.acknowledge_read(&conversation_id).await;
        }
    }
}

/// Handler for `messageDeleted` events.
pub struct MessageDeletedHandler;

#[async_trait]
impl EventHandler for MessageDeletedHandler {
    fn event(&self) -> &'static str {
        EVT_MESSAGE_DELETED
    }

    async fn handle(&self, client: Arc<Client>, data: serde_json::Value) {
        let payload: MessageDeletedPayload = match serde_json::from_value(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "Client", "Malformed messageDeleted payload: {e}");
                return;
            }
        };
        client
            .remove_local(&payload.conversation_id, &payload.message_id)
            .await;
    }
}
