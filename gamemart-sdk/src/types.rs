//! Chat data model shared by the client, the wire protocol and observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

/// Delivery progress of a message.
///
/// Progress only moves forward: `sending < sent < delivered < read`.
/// `failed` is terminal and can only be reached from `sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Sending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => u8::MAX,
        }
    }

    /// Returns `next` if moving from `self` to `next` is a forward step.
    pub fn advance(self, next: MessageStatus) -> Option<MessageStatus> {
        match (self, next) {
            (Self::Failed, _) => None,
            (Self::Sending, Self::Failed) => Some(Self::Failed),
            (_, Self::Failed) => None,
            _ if next.rank() > self.rank() => Some(next),
            _ => None,
        }
    }
}

/// A message as the service delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "messageType", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    /// Echoed back to the author so an optimistic entry can be reconciled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

/// A message authored locally and not yet acknowledged by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub temp_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(rename = "messageType")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(chat_id: impl Into<String>, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            temp_id: generate_temp_id(),
            chat_id: chat_id.into(),
            content: content.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Optimistic local view of this message, authored by `sender_id`.
    pub fn to_pending(&self, sender_id: &str) -> ChatMessage {
        ChatMessage {
            id: self.temp_id.clone(),
            chat_id: self.chat_id.clone(),
            sender_id: sender_id.to_string(),
            content: self.content.clone(),
            kind: self.kind,
            status: MessageStatus::Sending,
            timestamp: self.timestamp,
            temp_id: Some(self.temp_id.clone()),
        }
    }
}

/// Someone started or stopped typing in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub chat_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
}

/// A user's online status changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user_id: String,
    pub status: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// A read or delivery acknowledgement for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub chat_id: String,
    pub message_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Client-side placeholder id: `temp-<unix ms>-<8 hex digits>`.
pub fn generate_temp_id() -> String {
    let now_ms = Utc::now().timestamp_millis();
    let salt: u32 = rand::random();
    format!("temp-{now_ms}-{salt:08x}")
}
