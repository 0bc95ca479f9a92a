use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::state::RelayState;

pub struct Relay {
    config: RelayConfig,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Serve until the listener fails.
    pub async fn run(self) -> Result<()> {
        let (addr, handle) = self.start().await?;
        tracing::info!("Relay ready on {addr}");
        handle.await?
    }

    /// Bind and serve in the background. Returns the bound address and the
    /// server task (for testing with `127.0.0.1:0`).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!(require_auth = self.config.require_auth, "Listening on {addr}");

        let state = Arc::new(RelayState::new(self.config));
        let router = crate::web::router(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await?;
            Ok(())
        });
        Ok((addr, handle))
    }
}
