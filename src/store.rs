//! In-memory cache of conversations and their message lists: the single
//! source of truth for rendering. Mutated only by the realtime channel
//! handlers, the send pipeline, and the polling fallback.

use std::collections::HashSet;

use crate::types::conversation::Conversation;
use crate::types::message::Message;

/// Result of an [`ConversationStore::upsert_message`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The message id was new and the message was appended.
    Appended,
    /// A message with the same id already existed and was updated in place.
    Updated,
    /// The owning conversation is not known locally; the caller should
    /// trigger a full refresh rather than fabricate a conversation.
    UnknownConversation,
}

/// Client-side cache of conversations, ordered most-recently-active first.
///
/// All operations are infallible local state transitions; errors belong to
/// the network-facing pipelines that call into the store.
#[derive(Debug)]
pub struct ConversationStore {
    current_user_id: String,
    conversations: Vec<Conversation>,
    unread: HashSet<String>,
    active: Option<String>,
}

impl ConversationStore {
    pub fn new(current_user_id: impl Into<String>) -> Self {
        Self {
            current_user_id: current_user_id.into(),
            conversations: Vec::new(),
            unread: HashSet::new(),
            active: None,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn is_unread(&self, conversation_id: &str) -> bool {
        self.unread.contains(conversation_id)
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, conversation_id: Option<String>) {
        self.active = conversation_id;
    }

    pub fn message_count(&self, conversation_id: &str) -> Option<usize> {
        self.conversation(conversation_id).map(|c| c.messages.len())
    }

    /// Full refresh from a server fetch. Recomputes the unread set from the
    /// message flags.
    pub fn replace_all(&mut self, mut conversations: Vec<Conversation>) {
        for conversation in &mut conversations {
            conversation.refresh_last_message();
        }
        self.unread = conversations
            .iter()
            .filter(|c| c.has_unread_for(&self.current_user_id))
            .map(|c| c.id.clone())
            .collect();
        self.conversations = conversations;
    }

    /// Refreshes a single conversation in place, keeping its list position.
    /// Used by the polling fallback. No-op if the conversation is unknown.
    pub fn replace_conversation(&mut self, mut conversation: Conversation) {
        conversation.refresh_last_message();
        if let Some(slot) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation.id)
        {
            if conversation.has_unread_for(&self.current_user_id)
                && self.active.as_deref() != Some(conversation.id.as_str())
            {
                self.unread.insert(conversation.id.clone());
            } else {
                self.unread.remove(&conversation.id);
            }
            *slot = conversation;
        }
    }

    /// Appends the message, or updates it in place when the id already
    /// exists (idempotent). Peer-authored messages arriving for an inactive
    /// conversation mark it unread.
    pub fn upsert_message(&mut self, conversation_id: &str, message: Message) -> UpsertOutcome {
        let active = self.active.clone();
        let current_user_id = self.current_user_id.clone();
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return UpsertOutcome::UnknownConversation;
        };

        let peer_authored = message.sender_id != current_user_id;
        let outcome = match conversation.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => {
                *slot = message;
                UpsertOutcome::Updated
            }
            None => {
                conversation.messages.push(message);
                UpsertOutcome::Appended
            }
        };
        conversation.refresh_last_message();

        if peer_authored && active.as_deref() != Some(conversation_id) {
            self.unread.insert(conversation_id.to_string());
        }
        outcome
    }

    /// The optimistic→confirmed swap: locates the row by its provisional id
    /// and replaces it with the confirmed message. If a row with the
    /// confirmed id already exists (the channel echo won the race), the
    /// provisional row is dropped instead of duplicated. Returns `false`
    /// if neither row was found.
    pub fn replace_message(
        &mut self,
        conversation_id: &str,
        old_id: &str,
        message: Message,
    ) -> bool {
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return false;
        };

        let confirmed_exists = conversation.messages.iter().any(|m| m.id == message.id);
        let replaced = if confirmed_exists {
            conversation.messages.retain(|m| m.id != old_id);
            if let Some(slot) = conversation.messages.iter_mut().find(|m| m.id == message.id) {
                *slot = message;
            }
            true
        } else if let Some(slot) = conversation.messages.iter_mut().find(|m| m.id == old_id) {
            *slot = message;
            true
        } else {
            false
        };
        conversation.refresh_last_message();
        replaced
    }

    /// Shallow removal: replies pointing at the removed message are kept,
    /// orphaned. Returns `false` if nothing was removed.
    pub fn remove_message(&mut self, conversation_id: &str, message_id: &str) -> bool {
        let current_user_id = self.current_user_id.clone();
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            return false;
        };

        let before = conversation.messages.len();
        conversation.messages.retain(|m| m.id != message_id);
        let removed = conversation.messages.len() != before;
        if removed {
            conversation.refresh_last_message();
            if !conversation.has_unread_for(&current_user_id) {
                self.unread.remove(conversation_id);
            }
        }
        removed
    }

    /// Moves a conversation to the head of the list (most-recently-active
    /// ordering).
    pub fn reorder_to_top(&mut self, conversation_id: &str) {
        if let Some(pos) = self
            .conversations
            .iter()
            .position(|c| c.id == conversation_id)
        {
            let conversation = self.conversations.remove(pos);
            self.conversations.insert(0, conversation);
        }
    }

    /// The local user opened the conversation: peer-authored messages become
    /// read and the unread flag is cleared.
    pub fn mark_read(&mut self, conversation_id: &str) {
        let current_user_id = self.current_user_id.clone();
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            for message in &mut conversation.messages {
                if message.sender_id != current_user_id {
                    message.read = true;
                }
            }
        }
        self.unread.remove(conversation_id);
    }

    /// A remote read receipt arrived: the peer has seen our messages, so
    /// every self-authored message in the conversation becomes read.
    pub fn mark_read_by_peer(&mut self, conversation_id: &str) {
        let current_user_id = self.current_user_id.clone();
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            for message in &mut conversation.messages {
                if message.sender_id == current_user_id {
                    message.read = true;
                }
            }
        }
    }
}
