//! Optimistic send pipeline: immediate local feedback for composed
//! messages, confirmation reconciliation, and deletion of messages that
//! are still provisional.

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::time::Duration;

use crate::client::Client;
use crate::request::{ApiError, SendMessageBody};
use crate::types::events::{MessageRemoved, MessageUpserted, SendWarning};
use crate::types::message::{Message, TEMP_ID_PREFIX, new_temp_id};

const DELETE_RETRY_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Error)]
pub enum SendError {
    /// The image upload failed before any optimistic state was created.
    #[error("image upload failed: {0}")]
    Upload(ApiError),
    #[error("delete failed: {0}")]
    Delete(ApiError),
}

/// A user-composed message about to enter the pipeline.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub text: String,
    /// Raw image bytes; uploaded before the optimistic entry is created.
    pub image: Option<Vec<u8>>,
    pub reply_to: Option<String>,
}

/// A deletion requested against a message that was still provisional.
/// Error-recovery queue entry, not authoritative state: consumed once the
/// durable id is discovered and the deletion is actually issued.
#[derive(Debug, Clone)]
pub struct PendingDeletion {
    pub conversation_id: String,
    pub temp_id: String,
    /// Enough content to re-identify the message once it has a durable id.
    pub text: String,
}

/// Reconciliation state owned by the send pipeline: the provisional→durable
/// id table and the pending-deletion queue.
#[derive(Debug, Default)]
pub struct SendReconciler {
    id_map: DashMap<String, String>,
    pending_deletions: Mutex<Vec<PendingDeletion>>,
}

impl SendReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, temp_id: &str, durable_id: &str) {
        self.id_map
            .insert(temp_id.to_string(), durable_id.to_string());
    }

    pub fn durable_for(&self, temp_id: &str) -> Option<String> {
        self.id_map.get(temp_id).map(|entry| entry.clone())
    }

    pub fn queue_deletion(&self, pending: PendingDeletion) {
        self.pending_deletions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(pending);
    }

    /// Drains the queued deletions for one conversation; unresolved entries
    /// are re-queued by the caller.
    pub fn take_for_conversation(&self, conversation_id: &str) -> Vec<PendingDeletion> {
        let mut queue = self
            .pending_deletions
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut taken = Vec::new();
        let mut kept = Vec::new();
        for entry in queue.drain(..) {
            if entry.conversation_id == conversation_id {
                taken.push(entry);
            } else {
                kept.push(entry);
            }
        }
        *queue = kept;
        taken
    }

    pub fn pending_count(&self) -> usize {
        self.pending_deletions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Client {
    /// Sends a message optimistically. The provisional entry is visible in
    /// the store before the durable write is issued, and the returned id is
    /// the confirmed one when the write succeeded, or the provisional one
    /// when confirmation failed (the message is presumed saved server-side;
    /// a full refresh is scheduled to reconcile).
    ///
    /// Only an image-upload failure aborts the send.
    pub async fn send_message(
        self: &Arc<Self>,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<String, SendError> {
        // Upload first: no optimistic entry exists if this fails.
        let image_url = match draft.image {
            Some(data) => Some(
                self.api
                    .upload_image(&data)
                    .await
                    .map_err(SendError::Upload)?,
            ),
            None => None,
        };

        let temp_id = new_temp_id();
        let provisional = Message {
            id: temp_id.clone(),
            sender_id: self.config.user_id.clone(),
            text: draft.text.clone(),
            timestamp: Utc::now(),
            image: image_url.clone(),
            reply_to: draft.reply_to.clone(),
            shared_post: None,
            read: false,
        };

        {
            let mut store = self.store.write().await;
            store.upsert_message(conversation_id, provisional.clone());
            store.reorder_to_top(conversation_id);
        }
        let _ = self.event_bus.message_upserted.send(Arc::new(MessageUpserted {
            conversation_id: conversation_id.to_string(),
            message: provisional,
        }));

        let body = SendMessageBody {
            text: draft.text,
            image: image_url,
            reply_to_id: draft.reply_to,
        };
        match self.api.send_message(conversation_id, &body).await {
            Ok(confirmed) => {
                self.reconciler.record(&temp_id, &confirmed.id);
                let replaced = self.store.write().await.replace_message(
                    conversation_id,
                    &temp_id,
                    confirmed.clone(),
                );
                if replaced {
                    let _ = self.event_bus.message_upserted.send(Arc::new(MessageUpserted {
                        conversation_id: conversation_id.to_string(),
                        message: confirmed.clone(),
                    }));
                }
                self.flush_pending_deletions(conversation_id).await;
                Ok(confirmed.id)
            }
            Err(e) => {
                // Favor not losing user content over strict consistency:
                // the optimistic entry stays, a refresh reconciles.
                warn!(target: "Client/Send", "Send confirmation failed for {temp_id}: {e}");
                let _ = self.event_bus.send_warning.send(Arc::new(SendWarning {
                    conversation_id: conversation_id.to_string(),
                    temp_id: temp_id.clone(),
                    reason: e.to_string(),
                }));
                let client = self.clone();
                tokio::spawn(async move {
                    client.refresh_conversations_with_retries().await;
                });
                Ok(temp_id)
            }
        }
    }

    /// Deletes a message. Deleting a still-provisional message with no
    /// durable id yet records a [`PendingDeletion`] and resolves it later;
    /// durable deletes hitting 404 are retried once, other failures refetch
    /// the conversation to restore ground truth.
    pub async fn delete_message(
        self: &Arc<Self>,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), SendError> {
        if message_id.starts_with(TEMP_ID_PREFIX) {
            if let Some(durable_id) = self.reconciler.durable_for(message_id) {
                // Confirmed in the meantime; the store row already carries
                // the durable id.
                self.remove_local(conversation_id, &durable_id).await;
                return self.issue_delete(conversation_id, &durable_id).await;
            }

            let text = {
                let store = self.store.read().await;
                store.conversation(conversation_id).and_then(|c| {
                    c.messages
                        .iter()
                        .find(|m| m.id == message_id)
                        .map(|m| m.text.clone())
                })
            };
            let Some(text) = text else {
                debug!(target: "Client/Send", "Delete of unknown provisional message {message_id}");
                return Ok(());
            };

            self.remove_local(conversation_id, message_id).await;
            info!(
                target: "Client/Send",
                "Message {message_id} is not durable yet; queuing deletion for reconciliation"
            );
            self.reconciler.queue_deletion(PendingDeletion {
                conversation_id: conversation_id.to_string(),
                temp_id: message_id.to_string(),
                text,
            });
            return Ok(());
        }

        self.remove_local(conversation_id, message_id).await;
        self.issue_delete(conversation_id, message_id).await
    }

    pub(crate) async fn remove_local(&self, conversation_id: &str, message_id: &str) {
        let removed = self
            .store
            .write()
            .await
            .remove_message(conversation_id, message_id);
        if removed {
            let _ = self.event_bus.message_removed.send(Arc::new(MessageRemoved {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            }));
        }
    }

    /// Issues the durable delete. A 404 means the message is not visible
    /// server-side yet; it is retried once after a short delay, and a
    /// second 404 is treated as already gone.
    pub(crate) async fn issue_delete(
        self: &Arc<Self>,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), SendError> {
        match self.api.delete_message(conversation_id, message_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(
                    target: "Client/Send",
                    "Delete of {message_id} returned 404; retrying once"
                );
                tokio::time::sleep(DELETE_RETRY_DELAY).await;
                match self.api.delete_message(conversation_id, message_id).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => self.delete_failed(conversation_id, e).await,
                }
            }
            Err(e) => self.delete_failed(conversation_id, e).await,
        }
    }

    async fn delete_failed(&self, conversation_id: &str, e: ApiError) -> Result<(), SendError> {
        warn!(target: "Client/Send", "Delete failed in {conversation_id}: {e}");
        self.emit_sync_error("message delete", e.to_string());

        // Refetch to restore ground truth.
        let peer_id = {
            let store = self.store.read().await;
            store
                .conversation(conversation_id)
                .map(|c| c.peer.id.clone())
        };
        if let Some(peer_id) = peer_id {
            match self.api.fetch_conversation(&peer_id).await {
                Ok(fetched) => {
                    self.store.write().await.replace_conversation(fetched);
                    let _ = self.event_bus.conversation_refreshed.send(Arc::new(
                        crate::types::events::ConversationRefreshed {
                            conversation_id: conversation_id.to_string(),
                        },
                    ));
                }
                Err(fetch_err) => {
                    warn!(target: "Client/Send", "Recovery refetch failed: {fetch_err}");
                }
            }
        }
        Err(SendError::Delete(e))
    }

    /// Retries queued deletions whose targets may have gained a durable id,
    /// first through the id table, then by matching identical text within
    /// the conversation. Unresolved entries go back on the queue.
    pub(crate) async fn flush_pending_deletions(self: &Arc<Self>, conversation_id: &str) {
        let pending = self.reconciler.take_for_conversation(conversation_id);
        if pending.is_empty() {
            return;
        }

        for entry in pending {
            let durable_id = match self.reconciler.durable_for(&entry.temp_id) {
                Some(id) => Some(id),
                None => {
                    // Only self-authored messages can have been provisional;
                    // a peer message with the same text is not ours to delete.
                    let store = self.store.read().await;
                    store.conversation(conversation_id).and_then(|c| {
                        c.messages
                            .iter()
                            .find(|m| {
                                !m.is_provisional()
                                    && m.sender_id == self.config.user_id
                                    && m.text == entry.text
                            })
                            .map(|m| m.id.clone())
                    })
                }
            };

            match durable_id {
                Some(durable_id) => {
                    info!(
                        target: "Client/Send",
                        "Resolved pending deletion {} -> {durable_id}", entry.temp_id
                    );
                    self.remove_local(conversation_id, &durable_id).await;
                    if let Err(e) = self.issue_delete(conversation_id, &durable_id).await {
                        warn!(target: "Client/Send", "Reconciled delete failed: {e}");
                    }
                }
                None => self.reconciler.queue_deletion(entry),
            }
        }
    }
}
