use std::time::Duration;

/// Configuration for a [`crate::client::Client`] session.
///
/// One config corresponds to one authenticated session: the auth token is
/// carried both in REST request headers and in the realtime identification
/// handshake.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_base_url: String,
    /// URL of the realtime WebSocket endpoint.
    pub ws_url: String,
    /// Session auth token.
    pub auth_token: String,
    /// Id of the authenticated user; used to distinguish self- from
    /// peer-authored messages.
    pub user_id: String,
    /// Interval of the polling fallback loop.
    pub poll_interval: Duration,
    /// Per-request timeout for REST fetches.
    pub fetch_timeout: Duration,
    /// Attempt ceiling for initial-load retries.
    pub fetch_retry_attempts: u32,
    /// Attempt ceiling for realtime reconnection before giving up and
    /// leaving the polling fallback as the only sync path.
    pub max_reconnect_attempts: u32,
    /// Upper bound on the reconnect backoff delay.
    pub reconnect_backoff_cap: Duration,
}

impl ClientConfig {
    pub fn new(
        api_base_url: impl Into<String>,
        ws_url: impl Into<String>,
        auth_token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_url: ws_url.into(),
            auth_token: auth_token.into(),
            user_id: user_id.into(),
            poll_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
            fetch_retry_attempts: 3,
            max_reconnect_attempts: 5,
            reconnect_backoff_cap: Duration::from_secs(30),
        }
    }
}
