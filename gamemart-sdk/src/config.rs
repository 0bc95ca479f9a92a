//! Connection settings for [`crate::ChatClient`].

use std::time::Duration;

use crate::error::{ChatError, Result};

/// Configuration for the chat connection manager.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Auth token sent in an `auth` frame right after every connect.
    pub token: Option<String>,
    /// Local user id. Messages from this sender get no delivery receipt.
    /// Replaced by the id the service reports in `auth_success`.
    pub user_id: Option<String>,
    /// Delay before the first retry; doubled for each further attempt.
    pub reconnect_base_delay: Duration,
    /// Retries after a drop before giving up until the next `connect()`.
    pub max_reconnect_attempts: u32,
    /// Interval between liveness pings while connected.
    pub heartbeat_interval: Duration,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Capacity of the command channel between handles and the connection task.
    pub command_buffer: usize,
    /// Recently seen message ids kept for receipt ordering.
    pub receipt_ledger_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            token: None,
            user_id: None,
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            command_buffer: 256,
            receipt_ledger_capacity: 1024,
        }
    }
}

impl ChatConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Check that `url` is a WebSocket URL.
    pub fn validate(&self) -> Result<url::Url> {
        let parsed = url::Url::parse(&self.url).map_err(|e| ChatError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(parsed),
            other => Err(ChatError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }
}
