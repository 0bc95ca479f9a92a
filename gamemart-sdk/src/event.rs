//! Notifications produced by the connection manager itself, as opposed to
//! payloads decoded from the wire (see [`crate::types`]).

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{ConnectionState, MessageStatus};

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// A retry is scheduled after `delay`. `attempt` starts at 1.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Every retry failed; only an explicit `connect()` starts over.
    ReconnectExhausted { attempts: u32 },
}

/// Outcome of the auth handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Success { user_id: String },
    Required,
}

/// A heartbeat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PongEvent {
    pub received_at: DateTime<Utc>,
    /// Time since the most recent ping, if one was sent on this connection.
    pub rtt: Option<Duration>,
}

/// A tracked message moved to a later status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub chat_id: String,
    pub message_id: String,
    pub status: MessageStatus,
}

/// Problems reported to the error observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorEvent {
    /// The service sent an `error` frame.
    Server { message: String, code: Option<String> },
    /// An outbound message was lost when the transport failed under it.
    SendFailed {
        temp_id: String,
        chat_id: String,
        reason: String,
    },
    /// The transport failed or a connect attempt did not succeed.
    Transport { reason: String },
}
