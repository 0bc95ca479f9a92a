use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gamemart_relay::config::RelayConfig;
use gamemart_relay::server::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs in production (GAMEMART_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("GAMEMART_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("gamemart_relay=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = RelayConfig::parse();
    tracing::info!("Starting chat relay on {}", config.listen_addr);
    if config.require_auth {
        tracing::info!("Clients must authenticate before chatting");
    }
    Relay::new(config).run().await
}
