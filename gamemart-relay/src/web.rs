//! HTTP surface: the `/ws` chat endpoint and a health check.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::session::Session;
use crate::state::RelayState;

pub fn router(state: Arc<RelayState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/v1/health", get(api_health))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    layer.allow_origin(AllowOrigin::list(
        origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok()),
    ))
}

// ── WebSocket ──

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// One task owns the socket: it reads client frames and writes whatever the
/// session's channel queues.
async fn handle_ws(mut socket: WebSocket, state: Arc<RelayState>) {
    let (tx, mut rx) = mpsc::channel::<String>(state.config.session_buffer.max(1));
    let mut session = Session::open(&state, tx);
    let send_timeout = std::time::Duration::from_secs(30);

    loop {
        tokio::select! {
            frame = socket.recv() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => session.handle_text(&state, text.as_str()),
                    Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => session.handle_text(&state, text),
                        Err(_) => tracing::debug!(session = session.id(), "Ignoring binary frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong handled by axum
                    Some(Err(e)) => {
                        tracing::debug!(session = session.id(), error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            out = rx.recv() => {
                let Some(text) = out else { break };
                match tokio::time::timeout(send_timeout, socket.send(WsMessage::Text(text.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => {
                        tracing::debug!(session = session.id(), "WebSocket send failed or timed out");
                        break;
                    }
                }
            }
        }
    }

    session.close(&state);
    let _ = socket.send(WsMessage::Close(None)).await;
}

// ── REST ──

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    rooms: usize,
    uptime_secs: u64,
}

async fn api_health(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.connection_count(),
        rooms: state.room_count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
