//! Per-connection protocol handling.
//!
//! A [`Session`] turns decoded client frames into relay actions. It never
//! touches the socket: replies and broadcasts are queued through
//! [`RelayState`] and written by the connection's socket task.

use chrono::Utc;
use gamemart_sdk::protocol::{
    AuthSuccess, ClientFrame, ReceiptPayload, ServerError, ServerFrame, TypingPayload,
};
use gamemart_sdk::types::{
    ChatMessage, MessageStatus, OutboundMessage, PresenceStatus, PresenceUpdate, Receipt,
    TypingIndicator,
};

use crate::msgid;
use crate::state::{RelayState, SessionId};

pub struct Session {
    id: SessionId,
    user_id: Option<String>,
    authenticated: bool,
}

impl Session {
    /// Register with `state`. When auth is required, `auth_required` is
    /// queued as the first frame.
    pub fn open(state: &RelayState, tx: tokio::sync::mpsc::Sender<String>) -> Self {
        let id = state.register(tx);
        let session = Self {
            id,
            user_id: None,
            authenticated: !state.config.require_auth,
        };
        if state.config.require_auth {
            session.reply(state, &ServerFrame::AuthRequired);
        }
        tracing::debug!(session = id, "Session opened");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Identity used for outgoing frames. Unauthenticated sessions on an
    /// open relay get a guest id.
    fn sender_id(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| format!("guest-{}", self.id))
    }

    pub fn handle_text(&mut self, state: &RelayState, text: &str) {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(session = self.id, error = %e, "Rejecting frame");
                self.error(state, &format!("unrecognized frame: {e}"), "bad_frame");
                return;
            }
        };

        match frame {
            ClientFrame::Ping => self.reply(state, &ServerFrame::Pong),
            ClientFrame::Auth(auth) => self.authenticate(state, auth.token),
            _ if !self.authenticated => {
                self.error(state, "not authenticated", "auth_required");
            }
            ClientFrame::JoinChat(room) => {
                state.join(self.id, &room.chat_id);
                tracing::debug!(session = self.id, chat_id = %room.chat_id, "Joined");
            }
            ClientFrame::LeaveChat(room) => {
                state.leave(self.id, &room.chat_id);
                tracing::debug!(session = self.id, chat_id = %room.chat_id, "Left");
            }
            ClientFrame::Message(message) => self.relay_message(state, message),
            ClientFrame::Typing(typing) => self.relay_typing(state, typing),
            ClientFrame::ReadReceipt(receipt) => {
                let frame = ServerFrame::ReadReceipt(self.receipt(receipt));
                self.forward(state, &frame);
            }
            ClientFrame::DeliveryReceipt(receipt) => {
                let frame = ServerFrame::DeliveryReceipt(self.receipt(receipt));
                self.forward(state, &frame);
            }
        }
    }

    /// In development the token is the user id.
    fn authenticate(&mut self, state: &RelayState, token: String) {
        let user_id = token.trim().to_string();
        if user_id.is_empty() {
            self.error(state, "empty token", "auth_failed");
            return;
        }
        state.set_user(self.id, &user_id);
        self.user_id = Some(user_id.clone());
        self.authenticated = true;
        tracing::info!(session = self.id, %user_id, "Authenticated");

        self.reply(
            state,
            &ServerFrame::AuthSuccess(AuthSuccess {
                user_id: user_id.clone(),
            }),
        );
        let presence = ServerFrame::Presence(PresenceUpdate {
            user_id,
            status: PresenceStatus::Online,
            last_seen: None,
        });
        if let Some(text) = encode(&presence) {
            state.broadcast_all(&text, Some(self.id));
        }
    }

    /// Assign a server id and fan out to the room. Senders that have not
    /// joined the room are joined implicitly.
    fn relay_message(&self, state: &RelayState, outbound: OutboundMessage) {
        if outbound.chat_id.is_empty() {
            self.error(state, "message without chatId", "bad_frame");
            return;
        }
        state.join(self.id, &outbound.chat_id);

        let mut message = ChatMessage {
            id: msgid::generate(),
            chat_id: outbound.chat_id,
            sender_id: self.sender_id(),
            content: outbound.content,
            kind: outbound.kind,
            status: MessageStatus::Sent,
            timestamp: Utc::now(),
            temp_id: None,
        };
        tracing::debug!(session = self.id, chat_id = %message.chat_id, id = %message.id, "Message");

        if let Some(text) = encode(&ServerFrame::Message(message.clone())) {
            state.broadcast_room(&message.chat_id, &text, Some(self.id));
        }
        message.temp_id = Some(outbound.temp_id);
        self.reply(state, &ServerFrame::Message(message));
    }

    fn relay_typing(&self, state: &RelayState, typing: TypingPayload) {
        let frame = ServerFrame::Typing(TypingIndicator {
            chat_id: typing.chat_id,
            user_id: self.sender_id(),
            is_typing: typing.is_typing,
        });
        self.forward(state, &frame);
    }

    fn receipt(&self, payload: ReceiptPayload) -> Receipt {
        Receipt {
            chat_id: payload.chat_id,
            message_id: payload.message_id,
            user_id: self.sender_id(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Send to the other members of the frame's room. Only members may
    /// signal into a room.
    fn forward(&self, state: &RelayState, frame: &ServerFrame) {
        let chat_id = match frame {
            ServerFrame::Typing(t) => &t.chat_id,
            ServerFrame::ReadReceipt(r) | ServerFrame::DeliveryReceipt(r) => &r.chat_id,
            _ => return,
        };
        if !state.is_member(self.id, chat_id) {
            tracing::debug!(session = self.id, %chat_id, "Signal from non-member dropped");
            self.error(state, &format!("not in room {chat_id}"), "not_in_room");
            return;
        }
        if let Some(text) = encode(frame) {
            state.broadcast_room(chat_id, &text, Some(self.id));
        }
    }

    fn reply(&self, state: &RelayState, frame: &ServerFrame) {
        if let Some(text) = encode(frame) {
            state.send_to(self.id, &text);
        }
    }

    fn error(&self, state: &RelayState, message: &str, code: &str) {
        self.reply(
            state,
            &ServerFrame::Error(ServerError {
                message: message.to_string(),
                code: Some(code.to_string()),
            }),
        );
    }

    /// Unregister and announce `offline` for authenticated users.
    pub fn close(self, state: &RelayState) {
        let user = state.unregister(self.id);
        tracing::debug!(session = self.id, user = ?user, "Session closed");
        if let Some(user_id) = user {
            let presence = ServerFrame::Presence(PresenceUpdate {
                user_id,
                status: PresenceStatus::Offline,
                last_seen: Some(Utc::now()),
            });
            if let Some(text) = encode(&presence) {
                state.broadcast_all(&text, None);
            }
        }
    }
}

fn encode(frame: &ServerFrame) -> Option<String> {
    match frame.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode frame");
            None
        }
    }
}
