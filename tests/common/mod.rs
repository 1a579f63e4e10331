//! Shared fixtures for integration tests: a recording HTTP client serving
//! canned responses and a scripted transport factory.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use chucklechain_client::client::Client;
use chucklechain_client::config::ClientConfig;
use chucklechain_client::net::{HttpClient, HttpRequest, HttpResponse};
use chucklechain_client::transport::{Transport, TransportEvent, TransportFactory};
use chucklechain_client::types::conversation::{Conversation, Peer};
use chucklechain_client::types::message::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tokio::time::{Duration, timeout};

pub const BASE_URL: &str = "http://api.test";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Option<String>,
}

#[derive(Clone)]
enum CannedResponse {
    Ready(u16, String),
    /// Waits for the notify before responding, to model in-flight writes.
    Gated(Arc<Notify>, u16, String),
}

/// Mock HTTP client: canned responses keyed by `"METHOD path"`, recording
/// every request it serves.
#[derive(Default)]
pub struct RecordingHttpClient {
    routes: Mutex<HashMap<String, Vec<CannedResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.routes
            .lock()
            .unwrap()
            .entry(format!("{method} {path}"))
            .or_default()
            .push(CannedResponse::Ready(status, body.into()));
    }

    /// Replaces any previously registered responses for the route.
    pub fn set_route(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.routes.lock().unwrap().insert(
            format!("{method} {path}"),
            vec![CannedResponse::Ready(status, body.into())],
        );
    }

    /// Registers a response that is only served once `gate` is notified.
    pub fn route_gated(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: impl Into<String>,
    ) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.routes
            .lock()
            .unwrap()
            .entry(format!("{method} {path}"))
            .or_default()
            .push(CannedResponse::Gated(gate.clone(), status, body.into()));
        gate
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn execute(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            path: path.clone(),
            body: request
                .body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).to_string()),
        });

        let canned = {
            let mut routes = self.routes.lock().unwrap();
            let key = format!("{} {}", request.method, path);
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => Some(queue.remove(0)),
                Some(queue) => queue.first().cloned(),
                None => None,
            }
        };

        match canned {
            Some(CannedResponse::Ready(status, body)) => Ok(HttpResponse {
                status_code: status,
                body: body.into_bytes(),
            }),
            Some(CannedResponse::Gated(gate, status, body)) => {
                gate.notified().await;
                Ok(HttpResponse {
                    status_code: status,
                    body: body.into_bytes(),
                })
            }
            None => Ok(HttpResponse {
                status_code: 500,
                body: format!("no route for {} {}", request.method, path).into_bytes(),
            }),
        }
    }
}

/// Transport that records sent frames and never delivers anything unless
/// the test injects events through the factory.
pub struct ScriptedTransport {
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, frame: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    async fn disconnect(&self) {}
}

#[derive(Default)]
pub struct ScriptedTransportFactory {
    sent: Arc<Mutex<Vec<String>>>,
    latest_tx: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl ScriptedTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Injects a transport event into the most recent connection.
    pub async fn inject(&self, event: TransportEvent) {
        let tx = self
            .latest_tx
            .lock()
            .unwrap()
            .clone()
            .expect("no connection established yet");
        tx.send(event).await.expect("event loop stopped");
    }
}

#[async_trait]
impl TransportFactory for ScriptedTransportFactory {
    async fn create_transport(
        &self,
    ) -> anyhow::Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
        let (tx, rx) = mpsc::channel(16);
        *self.latest_tx.lock().unwrap() = Some(tx.clone());
        let transport = Arc::new(ScriptedTransport {
            sent: self.sent.clone(),
        });
        let _ = tx.send(TransportEvent::Connected).await;
        Ok((transport, rx))
    }
}

/// Transport whose sends always fail, for exercising handshake failures.
pub struct FailingSendTransport;

#[async_trait]
impl Transport for FailingSendTransport {
    async fn send(&self, _frame: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("socket write failed"))
    }

    async fn disconnect(&self) {}
}

#[derive(Default)]
pub struct FailingSendTransportFactory {
    create_calls: AtomicUsize,
}

impl FailingSendTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for FailingSendTransportFactory {
    async fn create_transport(
        &self,
    ) -> anyhow::Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let (_tx, rx) = mpsc::channel(1);
        Ok((Arc::new(FailingSendTransport), rx))
    }
}

pub fn message_fixture(id: &str, sender: &str, text: &str) -> Message {
    Message {
        id: id.to_string(),
        sender_id: sender.to_string(),
        text: text.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        image: None,
        reply_to: None,
        shared_post: None,
        read: false,
    }
}

pub fn conversation_fixture(id: &str, peer_id: &str, messages: Vec<Message>) -> Conversation {
    Conversation {
        id: id.to_string(),
        peer: Peer {
            id: peer_id.to_string(),
            username: format!("user-{peer_id}"),
            avatar: None,
        },
        messages,
        last_message: None,
    }
}

pub fn test_config() -> ClientConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    ClientConfig::new(BASE_URL, "ws://ws.test", "session-token", "me")
}

/// Builds a client over the mock seams, connects it, and waits for the
/// initial conversation load to land.
pub async fn connected_client(
    http: Arc<RecordingHttpClient>,
    conversations: Vec<Conversation>,
) -> (Arc<Client>, Arc<ScriptedTransportFactory>) {
    http.route(
        "GET",
        "/conversations",
        200,
        serde_json::to_string(&conversations).unwrap(),
    );

    let factory = ScriptedTransportFactory::new();
    let client = Client::new(test_config(), factory.clone(), http);

    let mut replaced = client.event_bus.conversations_replaced.subscribe();
    client.connect().await.expect("connect failed");
    timeout(Duration::from_secs(5), replaced.recv())
        .await
        .expect("initial load timed out")
        .expect("bus closed");

    (client, factory)
}
