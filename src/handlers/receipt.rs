use super::traits::EventHandler;
use crate::client::Client;
use crate::types::events::ConversationRead;
use crate::types::wire::{EVT_MESSAGE_READ, MessageReadPayload};
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// Handler for `messageRead` receipts.
///
/// The peer opened the conversation, so every self-authored message in it
/// becomes read. The contract tolerates this "conversation opened"
/// semantics; the payload's message id is advisory.
pub struct MessageReadHandler;

#[async_trait]
impl EventHandler for MessageReadHandler {
    fn event(&self) -> &'static str {
        EVT_MESSAGE_READ
    }

    async fn handle(&self, client: Arc<Client>, data: serde_json::Value) {
        let payload: MessageReadPayload = match serde_json::from_value(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "Client", "Malformed messageRead payload: {e}");
                return;
            }
        };

        client
            .store
            .write()
            .await
            .mark_read_by_peer(&payload.conversation_id);

        let _ = client.event_bus.conversation_read.send(Arc::new(ConversationRead {
            conversation_id: payload.conversation_id,
            by_peer: true,
        }));
    }
}
