mod config;
mod input;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use gamemart_sdk::event::{AuthEvent, ConnectionEvent, ErrorEvent};
use gamemart_sdk::{ChatClient, MessageKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::input::Input;

/// Terminal client for GameMart chat.
#[derive(Parser, Debug)]
#[command(name = "gamemart-chat", version, about)]
pub struct Cli {
    /// WebSocket endpoint (e.g. wss://chat.gamemart.example/ws).
    #[arg(long, env = "GAMEMART_CHAT_URL")]
    url: Option<String>,

    /// Auth token.
    #[arg(long, env = "GAMEMART_CHAT_TOKEN")]
    token: Option<String>,

    /// Local user id.
    #[arg(long)]
    user: Option<String>,

    /// Rooms to join on start (comma separated). The first is current.
    #[arg(long)]
    rooms: Option<String>,

    /// Retries after a drop before giving up.
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    /// Config file (default: ~/.config/gamemart/chat.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn now() -> String {
    stamp(Utc::now())
}

/// Print inbound events. Observers run on the connection task, so they
/// only format and print.
fn install_printers(client: &ChatClient) {
    let handlers = client.handlers();

    handlers.message.add(|m| {
        let id = m.temp_id.as_deref().map_or(m.id.clone(), |t| format!("{} ({t})", m.id));
        println!("{} [{}] <{}> {}  #{id}", stamp(m.timestamp), m.chat_id, m.sender_id, m.content);
    });
    handlers.typing.add(|t| {
        if t.is_typing {
            println!("{} [{}] {} is typing…", now(), t.chat_id, t.user_id);
        }
    });
    handlers.presence.add(|p| {
        println!("{} * {} is {:?}", now(), p.user_id, p.status);
    });
    handlers.status.add(|s| {
        println!("{} [{}] #{} {:?}", now(), s.chat_id, s.message_id, s.status);
    });
    handlers.connection.add(|e| match e {
        ConnectionEvent::StateChanged(state) => println!("{} -- {state}", now()),
        ConnectionEvent::ReconnectScheduled { attempt, delay } => {
            println!("{} -- reconnecting in {delay:?} (attempt {attempt})", now())
        }
        ConnectionEvent::ReconnectExhausted { attempts } => {
            println!("{} -- gave up after {attempts} attempts, /connect to retry", now())
        }
    });
    handlers.auth.add(|e| match e {
        AuthEvent::Success { user_id } => println!("{} -- signed in as {user_id}", now()),
        AuthEvent::Required => println!("{} -- server requires a token (--token)", now()),
    });
    handlers.error.add(|e| match e {
        ErrorEvent::Server { message, code } => {
            println!("{} !! {message}{}", now(), code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())
        }
        ErrorEvent::SendFailed { temp_id, chat_id, reason } => {
            println!("{} !! [{chat_id}] message {temp_id} not sent: {reason}", now())
        }
        ErrorEvent::Transport { reason } => tracing::debug!(%reason, "Transport error"),
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they don't interleave with chat output on stdout.
    let json_logs = std::env::var("GAMEMART_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let file_config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load(),
    };
    let session = config::Session::load();
    let resolved = config::Resolved::merge(&cli, &file_config, &session);
    tracing::info!(url = %resolved.chat.url, rooms = ?resolved.rooms, "Starting");

    let client = ChatClient::new(resolved.chat)?;
    install_printers(&client);

    for room in &resolved.rooms {
        client.join_chat(room).await?;
    }
    let mut current = resolved.current;
    client.connect().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let input = match input::parse(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match input {
            Input::Say(text) => match &current {
                Some(room) => {
                    client.send_message(room, &text, MessageKind::Text).await?;
                }
                None => println!("no current room, /join one first"),
            },
            Input::Join(room) => {
                client.join_chat(&room).await?;
                println!("-- current room: {room}");
                current = Some(room);
            }
            Input::Leave(room) => {
                let Some(room) = room.or_else(|| current.clone()) else {
                    println!("no current room");
                    continue;
                };
                client.leave_chat(&room).await?;
                if current.as_deref() == Some(room.as_str()) {
                    current = None;
                }
                println!("-- left {room}");
            }
            Input::Typing(on) => match &current {
                Some(room) => client.send_typing(room, on).await?,
                None => println!("no current room"),
            },
            Input::Read(id) => match &current {
                Some(room) => client.mark_read(room, &id).await?,
                None => println!("no current room"),
            },
            Input::Connect => client.connect().await?,
            Input::Disconnect => client.disconnect().await?,
            Input::Status => {
                let s = client.snapshot().await?;
                println!(
                    "-- {} | user {} | rooms [{}] | queued {} | retries {} | last pong {}",
                    s.state,
                    s.user_id.as_deref().unwrap_or("?"),
                    s.joined_chats.join(", "),
                    s.queued,
                    s.reconnect_attempts,
                    s.last_pong.map(stamp).unwrap_or_else(|| "never".to_string()),
                );
            }
            Input::Help => println!("{}", input::HELP),
            Input::Quit => break,
        }
    }

    let joined = client.snapshot().await?.joined_chats;
    config::Session {
        current: current.filter(|room| joined.contains(room)),
        rooms: joined,
    }
    .save();

    client.shutdown().await?;
    Ok(())
}
