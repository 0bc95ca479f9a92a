//! JSON envelopes exchanged with the chat service.
//!
//! Every frame is a text frame of the form `{"type": "...", "data": {...}}`.
//! Payload-less kinds (`ping`, `pong`, `auth_required`) omit `data`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ChatMessage, OutboundMessage, PresenceUpdate, Receipt, TypingIndicator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub chat_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth(AuthPayload),
    Message(OutboundMessage),
    Typing(TypingPayload),
    ReadReceipt(ReceiptPayload),
    DeliveryReceipt(ReceiptPayload),
    JoinChat(RoomPayload),
    LeaveChat(RoomPayload),
    Ping,
}

/// Frames sent by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    Message(ChatMessage),
    Typing(TypingIndicator),
    Presence(PresenceUpdate),
    ReadReceipt(Receipt),
    DeliveryReceipt(Receipt),
    Pong,
    AuthSuccess(AuthSuccess),
    AuthRequired,
    Error(ServerError),
}

/// Result of decoding an inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(ServerFrame),
    /// Well-formed envelope with a `type` this client does not know.
    Unknown(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of this frame's `type`, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Message(_) => "message",
            Self::Typing(_) => "typing",
            Self::ReadReceipt(_) => "read_receipt",
            Self::DeliveryReceipt(_) => "delivery_receipt",
            Self::JoinChat(_) => "join_chat",
            Self::LeaveChat(_) => "leave_chat",
            Self::Ping => "ping",
        }
    }
}

impl ServerFrame {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an inbound frame in two steps so an unknown `type` is reported
    /// by name instead of failing the whole decode.
    pub fn decode(text: &str) -> Result<Inbound> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let frame = match raw.kind.as_str() {
            "message" => Self::Message(serde_json::from_value(raw.data)?),
            "typing" => Self::Typing(serde_json::from_value(raw.data)?),
            "presence" => Self::Presence(serde_json::from_value(raw.data)?),
            "read_receipt" => Self::ReadReceipt(serde_json::from_value(raw.data)?),
            "delivery_receipt" => Self::DeliveryReceipt(serde_json::from_value(raw.data)?),
            "pong" => Self::Pong,
            "auth_success" => Self::AuthSuccess(serde_json::from_value(raw.data)?),
            "auth_required" => Self::AuthRequired,
            "error" => Self::Error(serde_json::from_value(raw.data)?),
            _ => return Ok(Inbound::Unknown(raw.kind)),
        };
        Ok(Inbound::Frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, PresenceStatus};

    #[test]
    fn ping_has_no_data() {
        let json = ClientFrame::Ping.encode().unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn outbound_message_envelope() {
        let out = OutboundMessage::new("trade-42", "is the skin still for sale?", MessageKind::Text);
        let json = ClientFrame::Message(out.clone()).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["data"]["chatId"], "trade-42");
        assert_eq!(value["data"]["tempId"], out.temp_id.as_str());
        assert_eq!(value["data"]["messageType"], "text");
    }

    #[test]
    fn receipt_envelopes_use_snake_case_kinds() {
        let payload = ReceiptPayload {
            chat_id: "c1".into(),
            message_id: "m1".into(),
        };
        let read: serde_json::Value =
            serde_json::from_str(&ClientFrame::ReadReceipt(payload.clone()).encode().unwrap()).unwrap();
        let delivered: serde_json::Value =
            serde_json::from_str(&ClientFrame::DeliveryReceipt(payload).encode().unwrap()).unwrap();
        assert_eq!(read["type"], "read_receipt");
        assert_eq!(delivered["type"], "delivery_receipt");
        assert_eq!(read["data"]["messageId"], "m1");
    }

    #[test]
    fn decode_inbound_message() {
        let text = r#"{"type":"message","data":{"id":"01J","chatId":"c1","senderId":"u2",
            "content":"gg","messageType":"text","timestamp":"2026-03-01T10:00:00Z"}}"#;
        match ServerFrame::decode(text).unwrap() {
            Inbound::Frame(ServerFrame::Message(msg)) => {
                assert_eq!(msg.id, "01J");
                assert_eq!(msg.sender_id, "u2");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn decode_payloadless_frames() {
        assert_eq!(
            ServerFrame::decode(r#"{"type":"pong"}"#).unwrap(),
            Inbound::Frame(ServerFrame::Pong)
        );
        assert_eq!(
            ServerFrame::decode(r#"{"type":"auth_required","data":null}"#).unwrap(),
            Inbound::Frame(ServerFrame::AuthRequired)
        );
    }

    #[test]
    fn decode_presence() {
        let text = r#"{"type":"presence","data":{"userId":"u9","status":"away"}}"#;
        match ServerFrame::decode(text).unwrap() {
            Inbound::Frame(ServerFrame::Presence(p)) => {
                assert_eq!(p.user_id, "u9");
                assert_eq!(p.status, PresenceStatus::Away);
                assert!(p.last_seen.is_none());
            }
            other => panic!("expected presence, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        let decoded = ServerFrame::decode(r#"{"type":"leaderboard","data":{"rank":1}}"#).unwrap();
        assert_eq!(decoded, Inbound::Unknown("leaderboard".to_string()));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(ServerFrame::decode("not json").is_err());
        assert!(ServerFrame::decode(r#"{"type":"typing","data":{"chatId":1}}"#).is_err());
    }

    #[test]
    fn server_frames_round_trip_through_relay_encoding() {
        let frame = ServerFrame::Error(ServerError {
            message: "not authenticated".into(),
            code: Some("auth".into()),
        });
        let text = frame.encode().unwrap();
        assert_eq!(ServerFrame::decode(&text).unwrap(), Inbound::Frame(frame));
    }
}
