//! Shared helpers for e2e tests. Received frames are logged with `[e2e] received: ...`.
//! Run tests with `--nocapture` to see them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use goclaw_core::channels::OutboundDispatcher;
use goclaw_core::{ChannelRegistry, ConfigLoader, ConfigRuntime, LaneScheduler, MemoryManager, MessageBus, SessionManager, SqliteMemoryStore};
use goclaw_gateway::{run_gateway_on_listener, GatewayDeps};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

async fn build_deps(token: Option<String>) -> (GatewayDeps, Arc<MessageBus>, Arc<ChannelRegistry>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionManager::new(dir.path().join("sessions")));
    let channels = Arc::new(ChannelRegistry::new());
    let config = Arc::new(
        ConfigRuntime::new(ConfigLoader::with_path(dir.path().join("config.json")), dir.path().join("config_history.json"))
            .await
            .unwrap(),
    );
    let store = Arc::new(SqliteMemoryStore::new(dir.path().join("memory.db"), 4).unwrap());
    let memory = Arc::new(MemoryManager::new(store, None));
    let lanes = Arc::new(LaneScheduler::new());
    let bus = Arc::new(MessageBus::default());
    let deps = GatewayDeps {
        sessions,
        channels: channels.clone(),
        config,
        memory,
        lanes,
        bus: bus.clone(),
        token,
    };
    (deps, bus, channels, dir)
}

/// Binds to a random port and spawns the gateway. Returns (ws_url, health_url, server_handle, tempdir).
/// The tempdir must be kept alive for the duration of the test (it backs the session/memory/config stores).
pub async fn spawn_gateway(
    token: Option<String>,
) -> (String, String, tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>, tempfile::TempDir) {
    let (ws_url, health_url, _bus, handle, dir) = spawn_gateway_with_bus(token).await;
    (ws_url, health_url, handle, dir)
}

/// Like [`spawn_gateway`], but also hands the bus back so tests can publish
/// events the connected client should observe. An outbound dispatcher runs
/// over the gateway's channel registry, as the runtime binary would have it.
pub async fn spawn_gateway_with_bus(
    token: Option<String>,
) -> (
    String,
    String,
    Arc<MessageBus>,
    tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
    tempfile::TempDir,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ws_url = format!("ws://{addr}/ws");
    let health_url = format!("http://{addr}/health");
    let (deps, bus, channels, dir) = build_deps(token).await;

    let dispatcher_bus = bus.clone();
    tokio::spawn(async move {
        let dispatcher = OutboundDispatcher::new(dispatcher_bus, channels);
        dispatcher.run(tokio_util::sync::CancellationToken::new()).await;
    });

    let handle = tokio::spawn(run_gateway_on_listener(listener, deps));
    (ws_url, health_url, bus, handle, dir)
}

pub async fn send_and_recv<W, R>(write: &mut W, read: &mut R, request: &Value) -> Value
where
    W: SinkExt<Message> + Unpin,
    W::Error: std::fmt::Debug,
    R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    write.send(Message::Text(request.to_string())).await.unwrap();
    recv_json(read).await
}

pub async fn recv_json<R>(read: &mut R) -> Value
where
    R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let msg = timeout(Duration::from_secs(5), read.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .unwrap();
    let text = msg.to_text().unwrap();
    eprintln!("[e2e] received: {text}");
    serde_json::from_str(text).unwrap()
}

pub fn rpc(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}
