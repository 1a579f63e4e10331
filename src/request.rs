//! REST API client for the conversation endpoints. All calls carry the
//! session token, apply a bounded timeout, and map failures into
//! [`ApiError`] so call sites can convert them to events instead of
//! letting them propagate.

use base64::Engine;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::net::{HttpClient, HttpRequest, HttpResponse};
use crate::types::conversation::Conversation;
use crate::types::message::Message;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("server returned status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status(404))
    }
}

/// Body of `POST /{conversationId}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody {
    image: String,
    is_message_image: bool,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Thin wrapper over the REST collaborator contract.
pub struct ApiClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth_token: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn prepare(&self, request: HttpRequest) -> HttpRequest {
        request
            .with_header("Authorization", format!("Bearer {}", self.auth_token))
            .with_header("Content-Type", "application/json")
            .with_timeout(self.timeout)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self
            .http
            .execute(self.prepare(request))
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if response.status_code >= 400 {
            return Err(ApiError::Status(response.status_code));
        }
        Ok(response)
    }

    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let response = self.execute(HttpRequest::get(self.url("/conversations"))).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Fetches the conversation with `peer_id`, creating it on demand
    /// server-side.
    pub async fn fetch_conversation(&self, peer_id: &str) -> Result<Conversation, ApiError> {
        let path = format!("/conversations/{}", urlencoding::encode(peer_id));
        let response = self.execute(HttpRequest::get(self.url(&path))).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        body: &SendMessageBody,
    ) -> Result<Message, ApiError> {
        let path = format!("/{}", urlencoding::encode(conversation_id));
        let request = HttpRequest::post(self.url(&path)).with_body(serde_json::to_vec(body)?);
        let response = self.execute(request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    pub async fn delete_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!(
            "/{}/{}",
            urlencoding::encode(conversation_id),
            urlencoding::encode(message_id)
        );
        self.execute(HttpRequest::delete(self.url(&path))).await?;
        Ok(())
    }

    pub async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        let path = format!("/{}/read", urlencoding::encode(conversation_id));
        self.execute(HttpRequest::put(self.url(&path))).await?;
        Ok(())
    }

    /// Uploads a message image ahead of the durable write; returns the
    /// hosted URL.
    pub async fn upload_image(&self, data: &[u8]) -> Result<String, ApiError> {
        let body = UploadBody {
            image: base64::engine::general_purpose::STANDARD.encode(data),
            is_message_image: true,
        };
        let request = HttpRequest::post(self.url("/upload")).with_body(serde_json::to_vec(&body)?);
        let response = self.execute(request).await?;
        let raw: UploadResponse = serde_json::from_slice(&response.body)?;
        Ok(raw.url)
    }
}

/// Retries `op` with exponential backoff, used for initial loads. The first
/// failure is retried after one second, doubling per attempt.
pub(crate) async fn with_retries<T, F, Fut>(
    op_name: &str,
    attempts: u32,
    op: F,
) -> Result<T, ApiError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut delay = Duration::from_secs(1);
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(target: "Client/Api", "{op_name} failed (attempt {attempt}/{attempts}): {e}");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.unwrap_or(ApiError::Transport("no attempts made".into())))
}
