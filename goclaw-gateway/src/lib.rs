//! Gateway facade: an `axum` HTTP+WS server
//! exposing a JSON-RPC 2.0 control plane over `goclaw-core`.
//!
//! `GET /health` reports liveness; `/ws` upgrades to a token-authenticated
//! JSON-RPC session that sends a `connected` notification immediately, then
//! answers `session.*`, `channels.*`, `config.*`, `memory.*`, `chat.send`, and
//! `lanes.status` requests. Agent-turn telemetry published on the bus is
//! pushed to every connected client as `agent.event` notifications, and
//! outbound messages addressed to the `ws` channel are delivered to the
//! originating connection as `message` notifications.
//!
//! **Public API**: [`run_gateway`], [`run_gateway_on_listener`], [`GatewayDeps`],
//! [`WsAdapter`].

mod app;
mod connection;
mod error;
mod response;
mod rpc;
mod ws_adapter;

use std::sync::Arc;

use goclaw_core::{ChannelRegistry, ConfigRuntime, LaneScheduler, MemoryManager, MessageBus, SessionManager};
use tokio::net::TcpListener;
use tracing::info;

use app::{router, AppState};
pub use ws_adapter::WsAdapter;

const DEFAULT_ADDR: &str = "127.0.0.1:8787";

/// Everything the gateway needs a handle to; built by the binary that wires
/// up a `goclaw-core` runtime (the CLI's `gateway run` subcommand).
pub struct GatewayDeps {
    pub sessions: Arc<SessionManager>,
    pub channels: Arc<ChannelRegistry>,
    pub config: Arc<ConfigRuntime>,
    pub memory: Arc<MemoryManager>,
    pub lanes: Arc<LaneScheduler>,
    pub bus: Arc<MessageBus>,
    pub token: Option<String>,
}

/// Runs the gateway on an existing listener. Used by tests (bind to
/// `127.0.0.1:0`, then pass the listener in so the ephemeral port is known
/// before the server starts accepting).
pub async fn run_gateway_on_listener(
    listener: TcpListener,
    deps: GatewayDeps,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("gateway listening on http://{addr} (ws at /ws, health at /health)");

    // The gateway is itself a channel: outbound messages routed to
    // `(ws, gateway)` land on the live connection whose session id matches.
    let ws_adapter = Arc::new(WsAdapter::new());
    deps.channels.register(ws_adapter.clone());

    let state = Arc::new(AppState::new(
        deps.sessions,
        deps.channels,
        deps.config,
        deps.memory,
        deps.lanes,
        deps.bus,
        ws_adapter,
        deps.token,
    ));
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs the gateway. Listens on `addr` (default `127.0.0.1:8787`, matching
/// `GatewayConfig::default()`).
pub async fn run_gateway(
    addr: Option<&str>,
    deps: GatewayDeps,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_gateway_on_listener(listener, deps).await
}
