//! Persistent configuration for gamemart-chat.
//!
//! Config file lives at `~/.config/gamemart/chat.toml`. Session state (the
//! rooms open on quit) lives next to it in `session.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use gamemart_sdk::ChatConfig;
use serde::{Deserialize, Serialize};

/// Default chat endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";

/// User configuration (persisted in chat.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// WebSocket endpoint.
    pub url: Option<String>,
    /// Auth token sent after every connect.
    pub token: Option<String>,
    /// Local user id (messages from it get no delivery receipt).
    pub user_id: Option<String>,
    /// Rooms to join on start. The first one is the current room.
    pub rooms: Option<Vec<String>>,
    pub reconnect_base_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat_secs: Option<u64>,
}

/// Session state saved on quit and restored on the next start.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Session {
    /// Rooms that were joined on quit.
    pub rooms: Vec<String>,
    /// Room that was current on quit.
    pub current: Option<String>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gamemart")
}

pub fn config_path() -> PathBuf {
    config_dir().join("chat.toml")
}

pub fn session_path() -> PathBuf {
    config_dir().join("session.toml")
}

impl Config {
    /// Load the default config file. A missing or unreadable file yields the
    /// defaults with a warning.
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file: {e:#}");
                Self::default()
            }
        }
    }

    /// Load an explicit config file. Errors are fatal here.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("bad config file {}", path.display()))
    }
}

impl Session {
    /// Load the saved session. A missing or bad file starts fresh.
    pub fn load() -> Self {
        let path = session_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Ignoring session file: {e:#}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("bad session file {}", path.display()))
    }

    /// Save to the default location, warning on failure.
    pub fn save(&self) {
        if let Err(e) = self.save_to(&session_path()) {
            tracing::warn!("Can't save session: {e:#}");
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("can't write {}", path.display()))
    }
}

/// Effective settings after merging CLI args > config file > session > defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub chat: ChatConfig,
    pub rooms: Vec<String>,
    /// Room plain lines go to.
    pub current: Option<String>,
}

impl Resolved {
    pub fn merge(cli: &crate::Cli, config: &Config, session: &Session) -> Self {
        let defaults = ChatConfig::default();

        let url = cli
            .url
            .clone()
            .or_else(|| config.url.clone())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let token = cli.token.clone().or_else(|| config.token.clone());
        let user_id = cli.user.clone().or_else(|| config.user_id.clone());

        let reconnect_base_delay = config
            .reconnect_base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.reconnect_base_delay);
        let max_reconnect_attempts = cli
            .max_reconnect_attempts
            .or(config.max_reconnect_attempts)
            .unwrap_or(defaults.max_reconnect_attempts);
        let heartbeat_interval = config
            .heartbeat_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);

        // Rooms: CLI > config > session > none
        let (rooms, current): (Vec<String>, _) = if let Some(ref rooms) = cli.rooms {
            let rooms: Vec<String> = rooms
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            let current = rooms.first().cloned();
            (rooms, current)
        } else if let Some(ref rooms) = config.rooms {
            (rooms.clone(), rooms.first().cloned())
        } else {
            let current = session
                .current
                .clone()
                .filter(|room| session.rooms.contains(room))
                .or_else(|| session.rooms.first().cloned());
            (session.rooms.clone(), current)
        };

        Self {
            chat: ChatConfig {
                url,
                token,
                user_id,
                reconnect_base_delay,
                max_reconnect_attempts,
                heartbeat_interval,
                ..defaults
            },
            rooms,
            current,
        }
    }
}
