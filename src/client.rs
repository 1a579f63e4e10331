use anyhow::anyhow;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::time::{Duration, sleep};

use crate::config::ClientConfig;
use crate::handlers::message::{MessageDeletedHandler, NewMessageHandler};
use crate::handlers::presence::{OnlineUsersHandler, UserConnectedHandler, UserDisconnectedHandler};
use crate::handlers::receipt::MessageReadHandler;
use crate::handlers::router::EventRouter;
use crate::net::{HttpClient, UreqHttpClient};
use crate::presence::PresenceTracker;
use crate::request::{ApiClient, ApiError, with_retries};
use crate::send::SendReconciler;
use crate::store::ConversationStore;
use crate::transport::{
    TokioWebSocketTransportFactory, Transport, TransportEvent, TransportFactory,
};
use crate::types::conversation::Conversation;
use crate::types::events::*;
use crate::types::presence::Presence;
use crate::types::wire::{EVT_IDENTIFY, EVT_MARK_READ, Frame, IdentifyPayload, MarkReadPayload};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("channel error: {0}")]
    Channel(String),
}

/// The realtime conversation client: owns the conversation store, the
/// presence tracker, the send pipeline state and the realtime channel
/// lifecycle. One instance per authenticated session.
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) store: RwLock<ConversationStore>,
    pub(crate) presence: RwLock<PresenceTracker>,
    pub(crate) reconciler: SendReconciler,
    pub event_bus: EventBus,
    pub(crate) api: ApiClient,

    pub(crate) transport: Mutex<Option<Arc<dyn Transport>>>,
    pub(crate) transport_events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    pub(crate) transport_factory: Arc<dyn TransportFactory>,
    pub(crate) router: EventRouter,

    pub(crate) is_connected: AtomicBool,
    pub(crate) is_connecting: AtomicBool,
    pub(crate) is_running: AtomicBool,
    pub(crate) expected_disconnect: AtomicBool,
    pub(crate) reconnect_errors: AtomicU32,
    pub(crate) shutdown_notifier: Notify,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        transport_factory: Arc<dyn TransportFactory>,
        http_client: Arc<dyn HttpClient>,
    ) -> Arc<Self> {
        let api = ApiClient::new(
            http_client,
            config.api_base_url.clone(),
            config.auth_token.clone(),
            config.fetch_timeout,
        );
        Arc::new(Self {
            store: RwLock::new(ConversationStore::new(config.user_id.clone())),
            presence: RwLock::new(PresenceTracker::new()),
            reconciler: SendReconciler::new(),
            event_bus: EventBus::new(),
            api,
            transport: Mutex::new(None),
            transport_events: Mutex::new(None),
            transport_factory,
            router: Self::build_router(),
            is_connected: AtomicBool::new(false),
            is_connecting: AtomicBool::new(false),
            is_running: AtomicBool::new(false),
            expected_disconnect: AtomicBool::new(false),
            reconnect_errors: AtomicU32::new(0),
            shutdown_notifier: Notify::new(),
            config,
        })
    }

    /// Convenience constructor wiring the WebSocket transport and blocking
    /// HTTP client from the config URLs.
    pub fn new_websocket(config: ClientConfig) -> Arc<Self> {
        let factory = Arc::new(TokioWebSocketTransportFactory::new(config.ws_url.clone()));
        Self::new(config, factory, Arc::new(UreqHttpClient::new()))
    }

    fn build_router() -> EventRouter {
        let mut router = EventRouter::new();

        router.register(Arc::new(NewMessageHandler));
        router.register(Arc::new(MessageDeletedHandler));
        router.register(Arc::new(MessageReadHandler));
        router.register(Arc::new(OnlineUsersHandler));
        router.register(Arc::new(UserConnectedHandler));
        router.register(Arc::new(UserDisconnectedHandler));

        router
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    /// Connects the realtime channel, identifies the session and kicks off
    /// the initial conversation load.
    pub async fn connect(self: &Arc<Self>) -> Result<(), anyhow::Error> {
        if self.is_connecting.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected.into());
        }

        let _guard = scopeguard::guard((), |_| {
            self.is_connecting.store(false, Ordering::Relaxed);
        });

        if self.is_connected() {
            return Err(ClientError::AlreadyConnected.into());
        }

        let (transport, transport_events) = self.transport_factory.create_transport().await?;
        *self.transport.lock().await = Some(transport);
        *self.transport_events.lock().await = Some(transport_events);
        self.is_connected.store(true, Ordering::Relaxed);

        // Presence is unknown until the next onlineUsers snapshot.
        self.presence.write().await.reset();

        // Identification handshake carries the session token. A failure
        // here must not leave a half-open connection behind, or every
        // later attempt would bail at the connected check without dialing.
        if let Err(e) = self
            .send_event(
                EVT_IDENTIFY,
                IdentifyPayload {
                    token: self.config.auth_token.clone(),
                },
            )
            .await
        {
            self.cleanup_connection_state().await;
            return Err(anyhow!("identify handshake failed: {e}"));
        }

        self.reconnect_errors.store(0, Ordering::Relaxed);
        let _ = self.event_bus.connected.send(Arc::new(Connected));

        // Initial load doubles as recovery for events missed while offline.
        let client = self.clone();
        tokio::spawn(async move {
            client.refresh_conversations_with_retries().await;
            client.send_presence(Presence::Active).await;
        });

        Ok(())
    }

    /// The main connection loop: connects, processes channel events, and
    /// reconnects with backoff up to the configured attempt ceiling. The
    /// polling fallback runs for the whole client lifetime regardless of
    /// channel health.
    pub async fn run(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Client `run` method called while already running.");
            return;
        }

        let poll_client = self.clone();
        tokio::spawn(async move { poll_client.poll_loop().await });

        while self.is_running.load(Ordering::Relaxed) {
            self.expected_disconnect.store(false, Ordering::Relaxed);

            if let Err(e) = self.connect().await {
                warn!("Failed to connect realtime channel: {e:?}");
            } else {
                if let Err(e) = self.read_events_loop().await {
                    warn!("Event loop exited: {e:?}. Will attempt to reconnect if enabled.");
                } else {
                    debug!("Event loop exited gracefully.");
                }
                self.cleanup_connection_state().await;
            }

            if self.expected_disconnect.load(Ordering::Relaxed)
                || !self.is_running.load(Ordering::Relaxed)
            {
                break;
            }

            let error_count = self.reconnect_errors.fetch_add(1, Ordering::SeqCst) + 1;
            if error_count >= self.config.max_reconnect_attempts {
                warn!(
                    "Giving up on the realtime channel after {error_count} attempts; \
                     the polling fallback remains active."
                );
                break;
            }

            let delay = Duration::from_secs(u64::from(error_count) * 2)
                .min(self.config.reconnect_backoff_cap);
            info!("Will attempt to reconnect in {delay:?} (attempt {error_count})");
            sleep(delay).await;
        }
        info!("Client run loop has shut down.");
    }

    /// Tears the session down: stops the run and polling loops and closes
    /// the channel.
    pub async fn disconnect(&self) {
        info!("Disconnecting client intentionally.");
        self.expected_disconnect.store(true, Ordering::Relaxed);
        self.is_running.store(false, Ordering::Relaxed);
        self.shutdown_notifier.notify_waiters();

        if let Some(transport) = self.transport.lock().await.as_ref() {
            transport.disconnect().await;
        }
        self.cleanup_connection_state().await;
        let _ = self.event_bus.disconnected.send(Arc::new(Disconnected));
    }

    async fn cleanup_connection_state(&self) {
        self.is_connected.store(false, Ordering::Relaxed);
        *self.transport.lock().await = None;
        *self.transport_events.lock().await = None;
    }

    async fn read_events_loop(self: &Arc<Self>) -> Result<(), anyhow::Error> {
        debug!(target: "Client", "Starting event processing loop...");

        let mut rx_guard = self.transport_events.lock().await;
        let mut transport_events = rx_guard
            .take()
            .ok_or_else(|| anyhow!("Cannot start event loop: not connected"))?;
        drop(rx_guard);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Client", "Shutdown signaled in event loop.");
                    return Ok(());
                },
                maybe_event = transport_events.recv() => {
                    match maybe_event {
                        Some(TransportEvent::Connected) => {
                            debug!(target: "Client", "Transport reports connected.");
                        }
                        Some(TransportEvent::FrameReceived(text)) => {
                            // Applied inline so store mutations keep
                            // event-arrival order.
                            self.handle_frame(&text).await;
                        }
                        Some(TransportEvent::Disconnected) | None => {
                            let _ = self.event_bus.disconnected.send(Arc::new(Disconnected));
                            return Err(anyhow!("realtime channel closed"));
                        }
                    }
                }
            }
        }
    }

    /// Decodes a channel frame and dispatches it to the registered handler.
    /// Malformed or unknown frames are logged and dropped; they never
    /// surface as blocking errors.
    pub async fn handle_frame(self: &Arc<Self>, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(target: "Client", "Dropping malformed frame: {e}");
                return;
            }
        };
        if !self
            .router
            .dispatch(self.clone(), &frame.event, frame.data)
            .await
        {
            debug!(target: "Client", "No handler for event '{}'", frame.event);
        }
    }

    /// Sends a structured event on the realtime channel.
    pub(crate) async fn send_event(
        &self,
        event: &str,
        data: impl Serialize,
    ) -> Result<(), ClientError> {
        let frame = Frame::new(event, data).map_err(|e| ClientError::Channel(e.to_string()))?;
        let text = serde_json::to_string(&frame).map_err(|e| ClientError::Channel(e.to_string()))?;

        let guard = self.transport.lock().await;
        let transport = guard.as_ref().ok_or(ClientError::NotConnected)?;
        transport
            .send(&text)
            .await
            .map_err(|e| ClientError::Channel(e.to_string()))
    }

    /// Replaces the whole store from a server fetch.
    pub async fn refresh_conversations(&self) -> Result<(), ApiError> {
        let conversations = self.api.fetch_conversations().await?;
        let count = conversations.len();
        self.store.write().await.replace_all(conversations);
        let _ = self
            .event_bus
            .conversations_replaced
            .send(Arc::new(ConversationsReplaced { count }));
        Ok(())
    }

    /// Initial-load variant with bounded exponential-backoff retries.
    pub(crate) async fn refresh_conversations_with_retries(&self) {
        let attempts = self.config.fetch_retry_attempts;
        if let Err(e) = with_retries("conversation list fetch", attempts, || {
            self.refresh_conversations()
        })
        .await
        {
            self.emit_sync_error("conversation list fetch", e.to_string());
        }
    }

    /// The user opened a conversation: it becomes the active one, its
    /// peer-authored messages are marked read locally, and read receipts go
    /// out over REST and the channel.
    pub async fn open_conversation(self: &Arc<Self>, conversation_id: &str) {
        {
            let mut store = self.store.write().await;
            store.set_active(Some(conversation_id.to_string()));
            store.mark_read(conversation_id);
        }
        let _ = self.event_bus.conversation_read.send(Arc::new(ConversationRead {
            conversation_id: conversation_id.to_string(),
            by_peer: false,
        }));
        self.acknowledge_read(conversation_id).await;
    }

    pub async fn close_conversation(&self) {
        self.store.write().await.set_active(None);
    }

    /// Read receipts: `PUT /{id}/read` plus the channel acknowledgement.
    /// Both are best-effort.
    pub(crate) async fn acknowledge_read(self: &Arc<Self>, conversation_id: &str) {
        if let Err(e) = self.api.mark_read(conversation_id).await {
            warn!(target: "Client", "Failed to mark conversation {conversation_id} read: {e}");
            self.emit_sync_error("mark read", e.to_string());
        }
        if let Err(e) = self
            .send_event(
                EVT_MARK_READ,
                MarkReadPayload {
                    conversation_id: conversation_id.to_string(),
                },
            )
            .await
        {
            debug!(target: "Client", "Read acknowledgement not delivered: {e}");
        }
    }

    pub(crate) fn emit_sync_error(&self, context: &'static str, detail: String) {
        let _ = self
            .event_bus
            .sync_error
            .send(Arc::new(SyncError { context, detail }));
    }

    // --- Read surface for rendering ---

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.store.read().await.conversations().to_vec()
    }

    pub async fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.store.read().await.conversation(conversation_id).cloned()
    }

    pub async fn is_unread(&self, conversation_id: &str) -> bool {
        self.store.read().await.is_unread(conversation_id)
    }

    pub async fn active_conversation(&self) -> Option<String> {
        self.store.read().await.active().map(str::to_string)
    }

    pub async fn is_peer_online(&self, peer_id: &str) -> bool {
        self.presence.read().await.is_online(peer_id)
    }

    /// Never returns a value for a peer that is currently online.
    pub async fn peer_last_seen(&self, peer_id: &str) -> Option<DateTime<Utc>> {
        self.presence.read().await.last_seen(peer_id)
    }
}
