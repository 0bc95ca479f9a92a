//! Chat connection manager.
//!
//! [`ChatClient`] is a cheap, cloneable handle. All connection state lives in
//! one spawned task that owns the transport exclusively and serializes
//! everything that touches it: commands from handles, inbound frames,
//! heartbeat ticks and retry timers are all processed from a single
//! `select!` loop, so there is never more than one transport or more than
//! one connect attempt in flight.
//!
//! ## Lifecycle
//!
//! `Disconnected → Connecting → Connected`. A transport error or a close
//! from the peer goes back to `Disconnected` and schedules a retry after
//! `base × 2^(attempt−1)`. After `max_reconnect_attempts` failed retries the
//! client stays `Disconnected` until [`ChatClient::connect`] is called again,
//! which also resets the attempt counter. A successful connect resets it too.
//!
//! ## Delivery
//!
//! Messages written while not connected are queued and flushed in order
//! right after the next connect (after `auth` and room re-joins). There is no
//! acknowledgement protocol: a message lost in flight is reported to the
//! error observers as [`ErrorEvent::SendFailed`] and is not retried.
//!
//! Every inbound message from someone else is answered with a
//! `delivery_receipt`. Read receipts are only sent by [`ChatClient::mark_read`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::backoff::Backoff;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::event::{AuthEvent, ConnectionEvent, ErrorEvent, PongEvent};
use crate::handlers::Handlers;
use crate::protocol::{
    AuthPayload, ClientFrame, Inbound, ReceiptPayload, RoomPayload, ServerFrame, TypingPayload,
};
use crate::queue::OutboundQueue;
use crate::receipts::ReceiptLedger;
use crate::transport::{Connector, Transport, WsConnector};
use crate::types::{ChatMessage, ConnectionState, MessageKind, MessageStatus, OutboundMessage};

/// Point-in-time view of the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: ConnectionState,
    /// Retries consumed since the last successful or explicit connect.
    pub reconnect_attempts: u32,
    /// Messages waiting for the next connect.
    pub queued: usize,
    /// Rooms that are re-joined after every connect.
    pub joined_chats: Vec<String>,
    /// Local user id, from config or `auth_success`.
    pub user_id: Option<String>,
    pub last_pong: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Shutdown(oneshot::Sender<()>),
    Send(OutboundMessage),
    Typing { chat_id: String, is_typing: bool },
    MarkRead { chat_id: String, message_id: String },
    Join(String),
    Leave(String),
    Snapshot(oneshot::Sender<Snapshot>),
}

/// A handle to the chat connection task.
#[derive(Clone)]
pub struct ChatClient {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    handlers: Arc<Handlers>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", &*self.state_rx.borrow())
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl ChatClient {
    /// Spawn the connection task with the WebSocket connector.
    ///
    /// Must be called inside a tokio runtime. The client starts
    /// `Disconnected`; call [`connect`](Self::connect) to go online.
    pub fn new(config: ChatConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Spawn the connection task with a custom connector.
    pub fn with_connector(config: ChatConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let handlers = Arc::new(Handlers::default());

        let task = ConnectionTask::new(config, connector, Arc::clone(&handlers), state_tx, cmd_rx);
        tokio::spawn(task.run());

        Ok(Self {
            cmd_tx,
            state_rx,
            handlers,
        })
    }

    /// Observer registry. Observers run on the connection task.
    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.handlers
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver that sees every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Start connecting and reset the retry counter. No-op when already
    /// connected.
    pub async fn connect(&self) -> Result<()> {
        self.command(Command::Connect).await
    }

    /// Close the transport and cancel any scheduled retry. Queued messages
    /// and tracked rooms are kept for the next connect.
    ///
    /// Commands are handled in order, so a disconnect issued during a slow
    /// handshake takes effect once that attempt finishes (at most
    /// `connect_timeout`). If the attempt succeeded the new transport is
    /// closed; if it failed the retry it scheduled is cancelled.
    pub async fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect).await
    }

    /// Disconnect and stop the connection task. Every handle fails with
    /// [`ChatError::Closed`] afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Shutdown(tx)).await?;
        rx.await.map_err(|_| ChatError::Closed)
    }

    /// Send a message, or queue it until the next connect.
    ///
    /// Returns the outbound message so callers can show it optimistically
    /// under its temp id.
    pub async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<OutboundMessage> {
        let message = OutboundMessage::new(chat_id, content, kind);
        self.command(Command::Send(message.clone())).await?;
        Ok(message)
    }

    /// Typing signals are only sent while connected.
    pub async fn send_typing(&self, chat_id: &str, is_typing: bool) -> Result<()> {
        self.command(Command::Typing {
            chat_id: chat_id.to_string(),
            is_typing,
        })
        .await
    }

    /// Send a read receipt for `message_id`. Only sent while connected.
    pub async fn mark_read(&self, chat_id: &str, message_id: &str) -> Result<()> {
        self.command(Command::MarkRead {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        })
        .await
    }

    /// Join a room now (if connected) and after every reconnect.
    pub async fn join_chat(&self, chat_id: &str) -> Result<()> {
        self.command(Command::Join(chat_id.to_string())).await
    }

    pub async fn leave_chat(&self, chat_id: &str) -> Result<()> {
        self.command(Command::Leave(chat_id.to_string())).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| ChatError::Closed)
    }

    async fn command(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| ChatError::Closed)
    }
}

// ── Connection task ──

enum Flow {
    Continue,
    Stop,
}

struct ConnectionTask {
    config: ChatConfig,
    connector: Arc<dyn Connector>,
    handlers: Arc<Handlers>,
    state_tx: watch::Sender<ConnectionState>,
    cmd_rx: mpsc::Receiver<Command>,
    transport: Option<Box<dyn Transport>>,
    backoff: Backoff,
    retry_at: Option<Instant>,
    heartbeat: Interval,
    queue: OutboundQueue,
    joined: BTreeSet<String>,
    ledger: ReceiptLedger,
    user_id: Option<String>,
    last_ping: Option<Instant>,
    last_pong: Option<DateTime<Utc>>,
}

impl ConnectionTask {
    fn new(
        config: ChatConfig,
        connector: Arc<dyn Connector>,
        handlers: Arc<Handlers>,
        state_tx: watch::Sender<ConnectionState>,
        cmd_rx: mpsc::Receiver<Command>,
    ) -> Self {
        let period = config.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            backoff: Backoff::new(config.reconnect_base_delay, config.max_reconnect_attempts),
            ledger: ReceiptLedger::new(config.receipt_ledger_capacity),
            user_id: config.user_id.clone(),
            config,
            connector,
            handlers,
            state_tx,
            cmd_rx,
            transport: None,
            retry_at: None,
            heartbeat,
            queue: OutboundQueue::new(),
            joined: BTreeSet::new(),
            last_ping: None,
            last_pong: None,
        }
    }

    async fn run(mut self) {
        loop {
            let flow = if let Some(transport) = self.transport.as_mut() {
                tokio::select! {
                    frame = transport.recv() => {
                        match frame {
                            Some(Ok(text)) => self.handle_frame(&text).await,
                            Some(Err(e)) => self.connection_lost(e.to_string()),
                            None => self.connection_lost("closed by peer".to_string()),
                        }
                        Flow::Continue
                    }
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => Flow::Stop,
                    },
                    _ = self.heartbeat.tick() => {
                        self.send_heartbeat().await;
                        Flow::Continue
                    }
                }
            } else {
                let retry_at = self.retry_at;
                tokio::select! {
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => Flow::Stop,
                    },
                    _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                        self.retry_at = None;
                        self.attempt_connect().await;
                        Flow::Continue
                    }
                }
            };
            if let Flow::Stop = flow {
                break;
            }
        }
        self.close_transport().await;
        self.set_state(ConnectionState::Disconnected);
        tracing::debug!("Chat connection task stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Connect => {
                if self.transport.is_some() {
                    tracing::debug!("connect() while connected, ignoring");
                } else {
                    self.backoff.reset();
                    self.retry_at = None;
                    self.attempt_connect().await;
                }
            }
            Command::Disconnect => {
                self.retry_at = None;
                self.close_transport().await;
                self.set_state(ConnectionState::Disconnected);
                tracing::info!("Disconnected by caller");
            }
            Command::Shutdown(ack) => {
                self.retry_at = None;
                self.close_transport().await;
                self.set_state(ConnectionState::Disconnected);
                self.cmd_rx.close();
                let _ = ack.send(());
                return Flow::Stop;
            }
            Command::Send(message) => {
                if self.transport.is_some() {
                    self.send_outbound(message).await;
                } else {
                    tracing::debug!(temp_id = %message.temp_id, queued = self.queue.len() + 1, "Not connected, queueing message");
                    self.queue.push(message);
                }
            }
            Command::Typing { chat_id, is_typing } => {
                if self.transport.is_some() {
                    self.send_or_drop(ClientFrame::Typing(TypingPayload { chat_id, is_typing }))
                        .await;
                } else {
                    tracing::debug!(%chat_id, "Not connected, dropping typing signal");
                }
            }
            Command::MarkRead {
                chat_id,
                message_id,
            } => {
                if self.transport.is_some() {
                    self.send_or_drop(ClientFrame::ReadReceipt(ReceiptPayload {
                        chat_id,
                        message_id,
                    }))
                    .await;
                } else {
                    tracing::debug!(%chat_id, %message_id, "Not connected, dropping read receipt");
                }
            }
            Command::Join(chat_id) => {
                let newly_joined = self.joined.insert(chat_id.clone());
                if newly_joined && self.transport.is_some() {
                    self.send_or_drop(ClientFrame::JoinChat(RoomPayload { chat_id }))
                        .await;
                }
            }
            Command::Leave(chat_id) => {
                let was_joined = self.joined.remove(&chat_id);
                if was_joined && self.transport.is_some() {
                    self.send_or_drop(ClientFrame::LeaveChat(RoomPayload { chat_id }))
                        .await;
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
        Flow::Continue
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: *self.state_tx.borrow(),
            reconnect_attempts: self.backoff.attempt(),
            queued: self.queue.len(),
            joined_chats: self.joined.iter().cloned().collect(),
            user_id: self.user_id.clone(),
            last_pong: self.last_pong,
        }
    }

    // ── Connect / disconnect ──

    async fn attempt_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let url = self.config.url.clone();
        let attempt = self.backoff.attempt();
        tracing::debug!(%url, attempt, "Connecting");

        let result = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(&url)).await;
        match result {
            Ok(Ok(transport)) => {
                self.transport = Some(transport);
                self.backoff.reset();
                self.set_state(ConnectionState::Connected);
                tracing::info!(%url, "Connected");
                self.on_connected().await;
            }
            Ok(Err(e)) => {
                tracing::warn!(%url, error = %e, attempt, "Connect failed");
                self.handle_disconnect(e.to_string());
            }
            Err(_) => {
                let reason = format!("connect timed out after {:?}", self.config.connect_timeout);
                tracing::warn!(%url, attempt, "{reason}");
                self.handle_disconnect(reason);
            }
        }
    }

    /// Auth, room re-joins, then the offline queue, in that order.
    async fn on_connected(&mut self) {
        self.heartbeat.reset();
        self.last_ping = None;

        if let Some(token) = self.config.token.clone()
            && !self.send_or_drop(ClientFrame::Auth(AuthPayload { token })).await
        {
            return;
        }

        let rooms: Vec<String> = self.joined.iter().cloned().collect();
        for chat_id in rooms {
            if !self.send_or_drop(ClientFrame::JoinChat(RoomPayload { chat_id })).await {
                return;
            }
        }

        self.flush_queue().await;
    }

    /// Send every queued message exactly once, oldest first. On a write
    /// failure the failed message is reported and the rest go back in front.
    async fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let pending = self.queue.take_all();
        tracing::debug!(count = pending.len(), "Flushing queued messages");
        let mut pending = pending.into_iter();
        while let Some(message) = pending.next() {
            if let Err(e) = self.write(&ClientFrame::Message(message.clone())).await {
                self.report_send_failed(&message, &e);
                self.queue.restore_front(pending.collect());
                self.connection_lost(e.to_string());
                return;
            }
        }
    }

    /// Both transport errors and clean closes end up here.
    fn connection_lost(&mut self, reason: String) {
        tracing::warn!(%reason, "Connection lost");
        self.transport = None;
        self.handle_disconnect(reason);
    }

    fn handle_disconnect(&mut self, reason: String) {
        self.transport = None;
        self.set_state(ConnectionState::Disconnected);
        self.handlers.error.notify(&ErrorEvent::Transport { reason });

        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempt();
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Will reconnect");
                self.retry_at = Some(Instant::now() + delay);
                self.handlers
                    .connection
                    .notify(&ConnectionEvent::ReconnectScheduled { attempt, delay });
            }
            None => {
                let attempts = self.backoff.attempt();
                tracing::warn!(attempts, "Reconnect attempts exhausted, waiting for connect()");
                self.retry_at = None;
                self.handlers
                    .connection
                    .notify(&ConnectionEvent::ReconnectExhausted { attempts });
            }
        }
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take()
            && let Err(e) = transport.close().await
        {
            tracing::debug!(error = %e, "Transport close failed");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if *self.state_tx.borrow() == state {
            return;
        }
        self.state_tx.send_replace(state);
        self.handlers
            .connection
            .notify(&ConnectionEvent::StateChanged(state));
    }

    // ── Outbound ──

    async fn write(&mut self, frame: &ClientFrame) -> Result<()> {
        let text = frame.encode()?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(ChatError::transport("write", "not connected"));
        };
        tracing::trace!(kind = frame.kind(), "Sending frame");
        transport.send(text).await
    }

    /// Write a frame; on failure drop the connection. Returns whether the
    /// frame went out.
    async fn send_or_drop(&mut self, frame: ClientFrame) -> bool {
        match self.write(&frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = frame.kind(), error = %e, "Write failed");
                self.connection_lost(e.to_string());
                false
            }
        }
    }

    async fn send_outbound(&mut self, message: OutboundMessage) {
        if let Err(e) = self.write(&ClientFrame::Message(message.clone())).await {
            self.report_send_failed(&message, &e);
            self.connection_lost(e.to_string());
        }
    }

    fn report_send_failed(&self, message: &OutboundMessage, err: &ChatError) {
        tracing::warn!(temp_id = %message.temp_id, chat_id = %message.chat_id, error = %err, "Message lost in flight");
        self.handlers.error.notify(&ErrorEvent::SendFailed {
            temp_id: message.temp_id.clone(),
            chat_id: message.chat_id.clone(),
            reason: err.to_string(),
        });
    }

    async fn send_heartbeat(&mut self) {
        self.last_ping = Some(Instant::now());
        self.send_or_drop(ClientFrame::Ping).await;
    }

    // ── Inbound ──

    async fn handle_frame(&mut self, text: &str) {
        match ServerFrame::decode(text) {
            Ok(Inbound::Frame(frame)) => self.dispatch(frame).await,
            Ok(Inbound::Unknown(kind)) => {
                tracing::debug!(%kind, "Ignoring unknown frame type");
            }
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "Dropping malformed frame");
            }
        }
    }

    async fn dispatch(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Message(message) => {
                self.ledger.track(&message);
                self.handlers.message.notify(&message);
                if !self.is_own(&message) {
                    self.send_or_drop(ClientFrame::DeliveryReceipt(ReceiptPayload {
                        chat_id: message.chat_id,
                        message_id: message.id,
                    }))
                    .await;
                }
            }
            ServerFrame::Typing(typing) => self.handlers.typing.notify(&typing),
            ServerFrame::Presence(presence) => self.handlers.presence.notify(&presence),
            ServerFrame::ReadReceipt(receipt) => {
                self.handlers.read_receipt.notify(&receipt);
                if let Some(change) =
                    self.ledger
                        .apply(&receipt.chat_id, &receipt.message_id, MessageStatus::Read)
                {
                    self.handlers.status.notify(&change);
                }
            }
            ServerFrame::DeliveryReceipt(receipt) => {
                self.handlers.delivery_receipt.notify(&receipt);
                if let Some(change) = self.ledger.apply(
                    &receipt.chat_id,
                    &receipt.message_id,
                    MessageStatus::Delivered,
                ) {
                    self.handlers.status.notify(&change);
                }
            }
            ServerFrame::Pong => {
                let received_at = Utc::now();
                let rtt = self.last_ping.map(|sent| sent.elapsed());
                self.last_pong = Some(received_at);
                tracing::trace!(?rtt, "Pong");
                self.handlers.pong.notify(&PongEvent { received_at, rtt });
            }
            ServerFrame::AuthSuccess(auth) => {
                tracing::info!(user_id = %auth.user_id, "Authenticated");
                self.user_id = Some(auth.user_id.clone());
                self.handlers.auth.notify(&AuthEvent::Success {
                    user_id: auth.user_id,
                });
            }
            ServerFrame::AuthRequired => {
                if self.config.token.is_none() {
                    tracing::warn!("Service requires auth but no token is configured");
                }
                self.handlers.auth.notify(&AuthEvent::Required);
            }
            ServerFrame::Error(err) => {
                tracing::warn!(message = %err.message, code = ?err.code, "Service error");
                self.handlers.error.notify(&ErrorEvent::Server {
                    message: err.message,
                    code: err.code,
                });
            }
        }
    }

    /// Only the author's echo carries a temp id, so it identifies our own
    /// messages even when the service never told us our user id.
    fn is_own(&self, message: &ChatMessage) -> bool {
        message.temp_id.is_some() || self.user_id.as_deref() == Some(message.sender_id.as_str())
    }
}
