use clap::Parser;

/// Development relay for the GameMart chat protocol.
#[derive(Parser, Debug, Clone)]
#[command(name = "gamemart-relay", version, about)]
pub struct RelayConfig {
    /// HTTP/WebSocket listen address.
    #[arg(long, env = "GAMEMART_RELAY_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Send `auth_required` on connect and refuse chat traffic until an
    /// `auth` frame arrives.
    #[arg(long, env = "GAMEMART_RELAY_REQUIRE_AUTH")]
    pub require_auth: bool,

    /// Outbound frames buffered per connection before new ones are dropped.
    #[arg(long, default_value_t = 256)]
    pub session_buffer: usize,

    /// Origins allowed by CORS (comma separated). Empty allows any origin.
    #[arg(long, env = "GAMEMART_RELAY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            require_auth: false,
            session_buffer: 256,
            cors_origins: Vec::new(),
        }
    }
}
