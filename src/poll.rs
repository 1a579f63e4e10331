//! Polling fallback: a low-frequency drift detector that re-fetches the
//! active conversation and heals missed realtime events. Conservative by
//! design: local state is only replaced when the server holds strictly
//! more messages, so in-flight optimistic sends are never clobbered.

use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::client::Client;
use crate::request::ApiError;
use crate::types::events::ConversationRefreshed;

impl Client {
    /// The main polling loop. Spawned by `run` and stopped on shutdown.
    /// The running flag is re-checked around every pass: the shutdown
    /// notification is lost when it fires while a fetch is in flight.
    pub(crate) async fn poll_loop(self: Arc<Self>) {
        while self.is_running.load(Ordering::Relaxed) {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if !self.is_running.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Err(e) = self.poll_active_conversation().await {
                        debug!(target: "Client/Poll", "Poll pass failed: {e}");
                    }
                },
                _ = self.shutdown_notifier.notified() => {
                    break;
                }
            }
        }
        debug!(target: "Client/Poll", "Polling loop stopped.");
    }

    /// One polling pass. Returns `true` when the active conversation was
    /// replaced with fresher server state.
    pub async fn poll_active_conversation(&self) -> Result<bool, ApiError> {
        let target = {
            let store = self.store.read().await;
            store.active().and_then(|id| {
                store
                    .conversation(id)
                    .map(|c| (c.id.clone(), c.peer.id.clone()))
            })
        };
        let Some((conversation_id, peer_id)) = target else {
            return Ok(false);
        };

        let fetched = self.api.fetch_conversation(&peer_id).await?;

        // The count check runs under the write lock so a send landing
        // between fetch and replace still wins.
        let mut store = self.store.write().await;
        let local_count = store.message_count(&conversation_id).unwrap_or(0);
        if fetched.messages.len() <= local_count {
            return Ok(false);
        }

        info!(
            target: "Client/Poll",
            "Conversation {conversation_id} drifted ({} local, {} remote); replacing",
            local_count,
            fetched.messages.len()
        );
        store.replace_conversation(fetched);
        drop(store);

        let _ = self
            .event_bus
            .conversation_refreshed
            .send(Arc::new(ConversationRefreshed { conversation_id }));
        Ok(true)
    }
}
