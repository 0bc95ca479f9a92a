//! Transport seam between the connection task and the network.
//!
//! The connection task only sees text frames through [`Transport`]; the
//! default [`WsConnector`] opens WebSocket connections with
//! `tokio-tungstenite`. Other connectors (tests, proxies) plug in through
//! [`crate::ChatClient::with_connector`].

use std::sync::OnceLock;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{ChatError, Result};

/// An open, bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<()>;

    /// Next inbound text frame. `None` means the peer closed cleanly.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens transports. One call per connect attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// rustls 0.23 needs a process-level crypto provider before the first
/// `wss://` handshake.
fn install_crypto_provider() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// WebSocket connector (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        install_crypto_provider();
        let (stream, response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| ChatError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        tracing::debug!(%url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| ChatError::transport("write", e))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ChatError::transport("read", e))),
            };
            match message {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::debug!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    tracing::debug!(?frame, "Peer closed WebSocket");
                    return None;
                }
                // Protocol pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ChatError::transport("close", e))
    }
}
