//! End-to-end tests: SDK clients talking through an in-process relay.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gamemart_relay::config::RelayConfig;
use gamemart_relay::server::Relay;
use gamemart_sdk::event::{AuthEvent, ErrorEvent};
use gamemart_sdk::handlers::Observers;
use gamemart_sdk::types::{PresenceStatus, PresenceUpdate, Receipt};
use gamemart_sdk::{ChatClient, ChatConfig, ChatMessage, ConnectionState, MessageKind, MessageStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT_MS: u64 = 5000;

async fn start_relay(require_auth: bool) -> SocketAddr {
    let config = RelayConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        require_auth,
        ..Default::default()
    };
    let (addr, _handle) = Relay::new(config).start().await.unwrap();
    addr
}

fn client(addr: SocketAddr, token: Option<&str>) -> ChatClient {
    let config = ChatConfig {
        token: token.map(str::to_string),
        reconnect_base_delay: Duration::from_millis(50),
        ..ChatConfig::new(format!("ws://{addr}/ws"))
    };
    ChatClient::new(config).unwrap()
}

fn collect<T: Clone + Send + 'static>(observers: &Observers<T>) -> mpsc::UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    observers.add(move |value: &T| {
        let _ = tx.send(value.clone());
    });
    rx
}

/// Wait for a matching notification, skipping others.
async fn wait_for<T: std::fmt::Debug>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    predicate: impl Fn(&T) -> bool,
    desc: &str,
) -> T {
    let deadline = Duration::from_millis(TIMEOUT_MS);
    let start = tokio::time::Instant::now();
    loop {
        match timeout(deadline.saturating_sub(start.elapsed()), rx.recv()).await {
            Ok(Some(value)) if predicate(&value) => return value,
            Ok(Some(_)) => continue,
            _ => panic!("Timeout waiting for: {desc}"),
        }
    }
}

async fn wait_connected(client: &ChatClient) {
    let mut state = client.watch_state();
    timeout(
        Duration::from_millis(TIMEOUT_MS),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("Timeout waiting for connection")
    .unwrap();
}

/// Send a message and wait for the relay's echo, which also guarantees the
/// sender is a member of the room.
async fn send_and_wait_echo(
    client: &ChatClient,
    messages: &mut mpsc::UnboundedReceiver<ChatMessage>,
    chat_id: &str,
    content: &str,
) -> ChatMessage {
    let out = client
        .send_message(chat_id, content, MessageKind::Text)
        .await
        .unwrap();
    let temp_id = out.temp_id.clone();
    wait_for(
        messages,
        move |m| m.temp_id.as_deref() == Some(temp_id.as_str()),
        "own echo",
    )
    .await
}

#[tokio::test]
async fn message_delivery_and_receipts_between_two_clients() {
    let addr = start_relay(false).await;
    let seller = client(addr, Some("seller"));
    let buyer = client(addr, Some("buyer"));

    let mut seller_messages = collect(&seller.handlers().message);
    let mut seller_deliveries = collect(&seller.handlers().delivery_receipt);
    let mut seller_reads = collect(&seller.handlers().read_receipt);
    let mut seller_status = collect(&seller.handlers().status);
    let mut buyer_messages = collect(&buyer.handlers().message);

    seller.connect().await.unwrap();
    buyer.connect().await.unwrap();
    wait_connected(&seller).await;
    wait_connected(&buyer).await;

    send_and_wait_echo(&buyer, &mut buyer_messages, "trade-7", "still selling?").await;
    let echo = send_and_wait_echo(&seller, &mut seller_messages, "trade-7", "yes, 40 gold").await;
    assert_eq!(echo.sender_id, "seller");
    assert_eq!(echo.id.len(), 26);

    let received = wait_for(
        &mut buyer_messages,
        |m| m.content == "yes, 40 gold",
        "seller's message at buyer",
    )
    .await;
    assert_eq!(received.id, echo.id);
    assert!(received.temp_id.is_none());

    // Buyer's client acknowledges delivery on its own.
    let delivered: Receipt = wait_for(
        &mut seller_deliveries,
        |r| r.message_id == echo.id,
        "delivery receipt",
    )
    .await;
    assert_eq!(delivered.user_id, "buyer");
    wait_for(
        &mut seller_status,
        |c| c.message_id == echo.id && c.status == MessageStatus::Delivered,
        "delivered status",
    )
    .await;

    buyer.mark_read("trade-7", &echo.id).await.unwrap();
    wait_for(&mut seller_reads, |r| r.message_id == echo.id, "read receipt").await;
    wait_for(
        &mut seller_status,
        |c| c.message_id == echo.id && c.status == MessageStatus::Read,
        "read status",
    )
    .await;
}

#[tokio::test]
async fn guest_does_not_acknowledge_its_own_echo() {
    let addr = start_relay(false).await;
    let guest = client(addr, None);
    let watcher = client(addr, Some("watcher"));
    let mut guest_messages = collect(&guest.handlers().message);
    let mut guest_deliveries = collect(&guest.handlers().delivery_receipt);
    let mut watcher_messages = collect(&watcher.handlers().message);
    let mut watcher_deliveries = collect(&watcher.handlers().delivery_receipt);

    guest.connect().await.unwrap();
    watcher.connect().await.unwrap();
    wait_connected(&guest).await;
    wait_connected(&watcher).await;
    send_and_wait_echo(&watcher, &mut watcher_messages, "trade-3", "anyone?").await;

    let echo = send_and_wait_echo(&guest, &mut guest_messages, "trade-3", "me").await;
    assert!(echo.sender_id.starts_with("guest-"));
    assert!(guest.snapshot().await.unwrap().user_id.is_none());

    // The watcher still acknowledges the guest's message.
    let delivered = wait_for(
        &mut guest_deliveries,
        |r| r.message_id == echo.id,
        "watcher's delivery receipt",
    )
    .await;
    assert_eq!(delivered.user_id, "watcher");

    // The guest never acknowledges its own message.
    let own = timeout(Duration::from_millis(200), async {
        loop {
            match watcher_deliveries.recv().await {
                Some(r) if r.message_id == echo.id => return r,
                Some(_) => continue,
                None => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(own.is_err(), "guest acknowledged its own message: {own:?}");
}

#[tokio::test]
async fn typing_reaches_other_members_only() {
    let addr = start_relay(false).await;
    let a = client(addr, Some("alice"));
    let b = client(addr, Some("bob"));
    let mut a_messages = collect(&a.handlers().message);
    let mut b_messages = collect(&b.handlers().message);
    let mut b_typing = collect(&b.handlers().typing);

    a.connect().await.unwrap();
    b.connect().await.unwrap();
    wait_connected(&a).await;
    wait_connected(&b).await;
    send_and_wait_echo(&a, &mut a_messages, "lobby", "hi").await;
    send_and_wait_echo(&b, &mut b_messages, "lobby", "hey").await;

    a.send_typing("lobby", true).await.unwrap();
    let typing = wait_for(&mut b_typing, |t| t.is_typing, "typing").await;
    assert_eq!(typing.user_id, "alice");
    assert_eq!(typing.chat_id, "lobby");
}

#[tokio::test]
async fn queued_messages_are_delivered_after_connect() {
    let addr = start_relay(false).await;
    let seller = client(addr, Some("seller"));
    let mut messages = collect(&seller.handlers().message);

    let first = seller
        .send_message("trade-9", "one", MessageKind::Text)
        .await
        .unwrap();
    let second = seller
        .send_message("trade-9", "two", MessageKind::Text)
        .await
        .unwrap();
    assert_eq!(seller.snapshot().await.unwrap().queued, 2);

    seller.connect().await.unwrap();
    let echo1 = wait_for(&mut messages, |m| m.temp_id.is_some(), "first echo").await;
    let echo2 = wait_for(&mut messages, |m| m.temp_id.is_some(), "second echo").await;
    assert_eq!(echo1.temp_id.as_deref(), Some(first.temp_id.as_str()));
    assert_eq!(echo2.temp_id.as_deref(), Some(second.temp_id.as_str()));
    assert_eq!(seller.snapshot().await.unwrap().queued, 0);
}

#[tokio::test]
async fn presence_follows_auth_and_disconnect() {
    let addr = start_relay(false).await;
    let watcher = client(addr, Some("watcher"));
    let mut watcher_auth = collect(&watcher.handlers().auth);
    let mut presence = collect(&watcher.handlers().presence);
    watcher.connect().await.unwrap();
    wait_for(&mut watcher_auth, |e| matches!(e, AuthEvent::Success { .. }), "watcher auth").await;

    let seller = client(addr, Some("seller"));
    let mut seller_auth = collect(&seller.handlers().auth);
    seller.connect().await.unwrap();
    wait_for(&mut seller_auth, |e| matches!(e, AuthEvent::Success { .. }), "seller auth").await;

    let online: PresenceUpdate = wait_for(
        &mut presence,
        |p| p.user_id == "seller" && p.status == PresenceStatus::Online,
        "seller online",
    )
    .await;
    assert!(online.last_seen.is_none());

    seller.shutdown().await.unwrap();
    let offline = wait_for(
        &mut presence,
        |p| p.user_id == "seller" && p.status == PresenceStatus::Offline,
        "seller offline",
    )
    .await;
    assert!(offline.last_seen.is_some());
}

#[tokio::test]
async fn auth_required_blocks_unauthenticated_chat() {
    let addr = start_relay(true).await;
    let anonymous = client(addr, None);
    let mut auth = collect(&anonymous.handlers().auth);
    let mut errors = collect(&anonymous.handlers().error);

    anonymous.connect().await.unwrap();
    wait_for(&mut auth, |e| *e == AuthEvent::Required, "auth_required").await;

    anonymous
        .send_message("trade-1", "let me in", MessageKind::Text)
        .await
        .unwrap();
    wait_for(
        &mut errors,
        |e| matches!(e, ErrorEvent::Server { code: Some(code), .. } if code == "auth_required"),
        "auth_required error",
    )
    .await;

    let member = client(addr, Some("member"));
    let mut member_auth = collect(&member.handlers().auth);
    member.connect().await.unwrap();
    let success = wait_for(
        &mut member_auth,
        |e| matches!(e, AuthEvent::Success { .. }),
        "auth success",
    )
    .await;
    assert_eq!(
        success,
        AuthEvent::Success {
            user_id: "member".to_string()
        }
    );
    assert_eq!(member.snapshot().await.unwrap().user_id.as_deref(), Some("member"));
}

#[tokio::test]
async fn raw_socket_ping_and_bad_frames() {
    let addr = start_relay(false).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    ws.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
    ws.send(Message::text(r#"{"type":"warp","data":{}}"#)).await.unwrap();

    let mut texts = Vec::new();
    while texts.len() < 2 {
        let frame = timeout(Duration::from_millis(TIMEOUT_MS), ws.next())
            .await
            .expect("Timeout waiting for relay frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            texts.push(serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap());
        }
    }
    assert_eq!(texts[0]["type"], "pong");
    assert_eq!(texts[1]["type"], "error");
    assert_eq!(texts[1]["data"]["code"], "bad_frame");
}

#[tokio::test]
async fn health_endpoint_reports_connections() {
    let addr = start_relay(false).await;
    let watcher = client(addr, Some("watcher"));
    let mut auth = collect(&watcher.handlers().auth);
    watcher.connect().await.unwrap();
    wait_for(&mut auth, |e| matches!(e, AuthEvent::Success { .. }), "auth").await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/v1/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(
        Duration::from_millis(TIMEOUT_MS),
        stream.read_to_string(&mut response),
    )
    .await
    .expect("Timeout reading health response")
    .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
    let health: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
}
