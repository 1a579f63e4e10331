use super::traits::EventHandler;
use crate::client::Client;
use crate::types::presence::PresenceUpdate;
use crate::types::wire::{
    EVT_ONLINE_USERS, EVT_USER_CONNECTED, EVT_USER_DISCONNECTED, UserConnectedPayload,
    UserDisconnectedPayload,
};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

/// Handler for `onlineUsers` snapshots: replaces the whole online set.
pub struct OnlineUsersHandler;

#[async_trait]
impl EventHandler for OnlineUsersHandler {
    fn event(&self) -> &'static str {
        EVT_ONLINE_USERS
    }

    async fn handle(&self, client: Arc<Client>, data: serde_json::Value) {
        let ids: Vec<String> = match serde_json::from_value(data) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(target: "Client", "Malformed onlineUsers payload: {e}");
                return;
            }
        };
        debug!(target: "Client", "Presence snapshot: {} peers online", ids.len());

        let mut presence = client.presence.write().await;
        presence.set_online(ids.clone());
        drop(presence);

        for user_id in ids {
            let _ = client.event_bus.presence.send(Arc::new(PresenceUpdate {
                user_id,
                online: true,
                last_seen: None,
            }));
        }
    }
}

/// Handler for incremental `userConnected` events.
pub struct UserConnectedHandler;

#[async_trait]
impl EventHandler for UserConnectedHandler {
    fn event(&self) -> &'static str {
        EVT_USER_CONNECTED
    }

    async fn handle(&self, client: Arc<Client>, data: serde_json::Value) {
        let payload: UserConnectedPayload = match serde_json::from_value(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "Client", "Malformed userConnected payload: {e}");
                return;
            }
        };

        client
            .presence
            .write()
            .await
            .mark_connected(payload.user_id.clone());

        let _ = client.event_bus.presence.send(Arc::new(PresenceUpdate {
            user_id: payload.user_id,
            online: true,
            last_seen: None,
        }));
    }
}

/// Handler for incremental `userDisconnected` events.
pub struct UserDisconnectedHandler;

#[async_trait]
impl EventHandler for UserDisconnectedHandler {
    fn event(&self) -> &'static str {
        EVT_USER_DISCONNECTED
    }

    async fn handle(&self, client: Arc<Client>, data: serde_json::Value) {
        let payload: UserDisconnectedPayload = match serde_json::from_value(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "Client", "Malformed userDisconnected payload: {e}");
                return;
            }
        };

        client
            .presence
            .write()
            .await
            .mark_disconnected(payload.user_id.clone(), payload.last_active);

        let _ = client.event_bus.presence.send(Arc::new(PresenceUpdate {
            user_id: payload.user_id,
            online: false,
            last_seen: payload.last_active,
        }));
    }
}
