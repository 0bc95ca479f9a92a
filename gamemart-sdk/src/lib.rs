//! Client SDK for gamemart real-time chat.
//!
//! [`client::ChatClient`] keeps one logical connection to the chat service,
//! reconnects with exponential backoff, queues outbound messages while
//! offline and fans inbound frames out to the observers registered on
//! [`handlers::Handlers`].

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod protocol;
pub mod queue;
pub mod receipts;
pub mod transport;
pub mod types;

pub use client::ChatClient;
pub use config::ChatConfig;
pub use error::{ChatError, Result};
pub use types::{ChatMessage, ConnectionState, MessageKind, MessageStatus, OutboundMessage};
