//! Error type for all fallible SDK operations.

/// Errors surfaced by the chat SDK.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The configured endpoint is not a usable `ws://` or `wss://` URL.
    #[error("invalid chat url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Opening the transport failed or timed out.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The transport failed while reading or writing a frame.
    #[error("transport {context} failed: {reason}")]
    Transport { context: &'static str, reason: String },

    /// A frame could not be encoded or decoded.
    #[error("frame codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The connection task is gone (the client was shut down).
    #[error("chat client is closed")]
    Closed,
}

impl ChatError {
    pub(crate) fn transport(context: &'static str, err: impl ToString) -> Self {
        Self::Transport {
            context,
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
