//! Axum app: state, router, `/health`, and the `/ws` upgrade handler.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use goclaw_core::{ChannelRegistry, ConfigRuntime, LaneScheduler, MemoryManager, MessageBus, SessionManager};
use serde::Deserialize;
use serde_json::json;

use super::connection::handle_socket;
use super::ws_adapter::WsAdapter;

/// WebSocket close code for a missing or invalid auth token. `4001` sits in
/// the private-use range (`4000..=4999`) the WebSocket protocol reserves for
/// applications, well outside the protocol's own reserved codes.
pub(crate) const CLOSE_UNAUTHORIZED: u16 = 4001;

pub(crate) struct AppState {
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) channels: Arc<ChannelRegistry>,
    pub(crate) config: Arc<ConfigRuntime>,
    pub(crate) memory: Arc<MemoryManager>,
    pub(crate) lanes: Arc<LaneScheduler>,
    pub(crate) bus: Arc<MessageBus>,
    pub(crate) ws_adapter: Arc<WsAdapter>,
    pub(crate) token: Option<String>,
    started_at: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        sessions: Arc<SessionManager>,
        channels: Arc<ChannelRegistry>,
        config: Arc<ConfigRuntime>,
        memory: Arc<MemoryManager>,
        lanes: Arc<LaneScheduler>,
        bus: Arc<MessageBus>,
        ws_adapter: Arc<WsAdapter>,
        token: Option<String>,
    ) -> Self {
        Self { sessions, channels, config, memory, lanes, bus, ws_adapter, token, started_at: Instant::now() }
    }

    fn token_is_valid(&self, presented: Option<&str>) -> bool {
        match &self.token {
            None => true,
            Some(expected) => presented.is_some_and(|p| p == expected),
        }
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "time": Utc::now(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
struct WsParams {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let header_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("Bearer ").to_string());
    let presented = params.token.or(header_token);
    let authorized = state.token_is_valid(presented.as_deref());

    ws.on_upgrade(move |mut socket| async move {
        if !authorized {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_UNAUTHORIZED,
                    reason: "missing or invalid token".into(),
                })))
                .await;
            return;
        }
        handle_socket(socket, state).await;
    })
}
