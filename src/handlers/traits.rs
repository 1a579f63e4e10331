use crate::client::Client;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for handling a specific realtime channel event.
///
/// Each handler is responsible for one event name (e.g. "newMessage",
/// "userConnected"). This keeps event semantics separated from the channel
/// plumbing and makes new events additive.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The event name this handler is responsible for.
    fn event(&self) -> &'static str;

    /// Handle the decoded payload. Handlers never fail the channel: a
    /// malformed payload is logged and dropped.
    async fn handle(&self, client: Arc<Client>, data: serde_json::Value);
}
