use super::traits::EventHandler;
use crate::client::Client;
use std::collections::HashMap;
use std::sync::Arc;

/// Central router dispatching realtime channel events to their handlers.
pub struct EventRouter {
    /// Map of event name -> handler for fast lookups
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl EventRouter {
    /// Create a new empty router.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for its event name.
    ///
    /// # Panics
    /// Panics if a handler is already registered for the same event to
    /// prevent accidental overwrites during initialization.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        let event = handler.event();
        if self.handlers.insert(event, handler).is_some() {
            panic!("Handler for event '{}' already registered", event);
        }
    }

    /// Dispatch a decoded frame to its handler.
    ///
    /// Returns `true` if a handler was registered for the event name.
    pub async fn dispatch(
        &self,
        client: Arc<Client>,
        event: &str,
        data: serde_json::Value,
    ) -> bool {
        if let Some(handler) = self.handlers.get(event) {
            handler.handle(client, data).await;
            true
        } else {
            false
        }
    }

    /// Get the number of registered handlers (useful for testing).
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
