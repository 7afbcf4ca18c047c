//! JSON-RPC 2.0 request/response envelopes and method dispatch.

use std::sync::Arc;

use goclaw_core::memory::{MemoryFilter, SearchOptions, VectorStore};
use goclaw_core::RuntimeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::{from_session_error, from_store_error};

#[derive(Debug, Deserialize)]
pub(crate) struct RpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Value,
}

pub(crate) fn connected_notification(session_id: &str) -> Notification {
    Notification {
        jsonrpc: "2.0",
        method: "connected",
        params: json!({ "session_id": session_id }),
    }
}

/// A request that never parsed as JSON-RPC at all doesn't have an `id` to
/// echo back; `Value::Null` is the JSON-RPC convention for that case.
pub(crate) fn parse_error(message: String) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id: Value::Null,
        result: None,
        error: Some(RpcError { code: -31001, message, details: None }),
    }
}

/// Maps the taxonomy onto JSON-RPC error codes outside the
/// reserved `-32768..=-32000` range used by the protocol's own predefined
/// errors.
fn runtime_error_code(e: &RuntimeError) -> i64 {
    match e {
        RuntimeError::InvalidInput(_) => -31001,
        RuntimeError::NotFound(_) => -31002,
        RuntimeError::PermissionDenied(_) => -31003,
        RuntimeError::PreconditionFailed(_) => -31004,
        RuntimeError::Unavailable(_) => -31005,
        RuntimeError::Timeout(_) => -31006,
        RuntimeError::RateLimited(_) => -31007,
        RuntimeError::ContextOverflow(_) => -31008,
        RuntimeError::Conflict(_) => -31009,
        RuntimeError::Internal(_) => -31010,
    }
}

fn to_error_response(id: Value, e: RuntimeError) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code: runtime_error_code(&e), message: e.to_string(), details: Some(json!({ "taxonomy": e.code() })) }),
    }
}

fn ok_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse { jsonrpc: "2.0", id, result: Some(result), error: None }
}

pub(crate) async fn dispatch(req: RpcRequest, state: &Arc<AppState>, session_id: &str) -> RpcResponse {
    let id = req.id;
    let result = match req.method.as_str() {
        "session.get" => session_get(state, &req.params).await,
        "session.list" => session_list(state).await,
        "session.clear" => session_clear(state, &req.params).await,
        "channels.list" => channels_list(state).await,
        "channels.status" => channels_status(state).await,
        "config.show" => config_show(state).await,
        "config.history" => config_history(state).await,
        "config.rollback" => config_rollback(state, &req.params).await,
        "memory.search" => memory_search(state, &req.params).await,
        "memory.status" => memory_status(state).await,
        "lanes.status" => lanes_status(state).await,
        "chat.send" => chat_send(state, &req.params, session_id),
        other => Err(RuntimeError::InvalidInput(format!("unknown method {other:?}"))),
    };
    match result {
        Ok(value) => ok_response(id, value),
        Err(e) => to_error_response(id, e),
    }
}

/// Publishes a browser-originated turn as an inbound `ws`-channel message.
/// The connection's session id doubles as sender and chat id, so the reply
/// routes back to this exact socket via the outbound dispatcher.
fn chat_send(state: &Arc<AppState>, params: &Value, session_id: &str) -> Result<Value, RuntimeError> {
    let content = require_str(params, "content")?;
    if content.trim().is_empty() {
        return Err(RuntimeError::InvalidInput("content must not be empty".to_string()));
    }
    let message = goclaw_core::bus::InboundMessage {
        id: uuid::Uuid::new_v4().to_string(),
        channel: crate::ws_adapter::WS_CHANNEL.to_string(),
        account_id: crate::ws_adapter::WS_ACCOUNT.to_string(),
        sender_id: session_id.to_string(),
        chat_id: session_id.to_string(),
        content,
        media: Vec::new(),
        metadata: serde_json::Map::new(),
        timestamp: chrono::Utc::now(),
    };
    let id = message.id.clone();
    state
        .bus
        .publish(goclaw_core::bus::Topic::Inbound, goclaw_core::bus::BusEvent::Inbound(message));
    Ok(json!({ "published": true, "id": id }))
}

fn require_str(params: &Value, field: &str) -> Result<String, RuntimeError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::InvalidInput(format!("missing required param {field:?}")))
}

/// `session.get` creates the session if absent, matching `SessionManager`'s
/// create-on-read contract; there is no separate non-creating lookup.
async fn session_get(state: &Arc<AppState>, params: &Value) -> Result<Value, RuntimeError> {
    let key = require_str(params, "key")?;
    let session = state.sessions.get_or_create(&key).await.map_err(from_session_error)?;
    let session = session.lock().await;
    Ok(json!({
        "key": session.key,
        "messages": session.messages,
        "created_at": session.created_at,
        "updated_at": session.updated_at,
        "metadata": session.metadata,
        "generation": session.generation,
    }))
}

async fn session_list(state: &Arc<AppState>) -> Result<Value, RuntimeError> {
    let keys = state.sessions.list().await.map_err(from_session_error)?;
    Ok(json!({ "sessions": keys }))
}

async fn session_clear(state: &Arc<AppState>, params: &Value) -> Result<Value, RuntimeError> {
    let key = require_str(params, "key")?;
    let session = state.sessions.get_or_create(&key).await.map_err(from_session_error)?;
    let cleared = {
        let mut guard = session.lock().await;
        guard.clear();
        guard.clone()
    };
    state.sessions.save(&cleared).await.map_err(from_session_error)?;
    Ok(json!({ "key": key, "generation": cleared.generation }))
}

async fn channels_list(state: &Arc<AppState>) -> Result<Value, RuntimeError> {
    let entries: Vec<Value> = state
        .channels
        .list()
        .into_iter()
        .map(|(channel, account_id)| json!({ "channel": channel, "account_id": account_id }))
        .collect();
    Ok(json!({ "channels": entries }))
}

async fn channels_status(state: &Arc<AppState>) -> Result<Value, RuntimeError> {
    // No per-adapter health probe exists yet; "status" is registration presence.
    let entries: Vec<Value> = state
        .channels
        .list()
        .into_iter()
        .map(|(channel, account_id)| json!({ "channel": channel, "account_id": account_id, "registered": true }))
        .collect();
    Ok(json!({ "channels": entries }))
}

fn redact_config(mut config: Value) -> Value {
    if let Some(token) = config.get_mut("gateway").and_then(|g| g.get_mut("token")) {
        if !token.is_null() {
            *token = json!("***redacted***");
        }
    }
    if let Some(providers) = config.get_mut("providers").and_then(Value::as_array_mut) {
        for provider in providers.iter_mut() {
            if let Some(key) = provider.get_mut("api_key") {
                if !key.is_null() {
                    *key = json!("***redacted***");
                }
            }
        }
    }
    config
}

async fn config_show(state: &Arc<AppState>) -> Result<Value, RuntimeError> {
    let config = state.config.get().await;
    let value = serde_json::to_value(config).map_err(|e| RuntimeError::Internal(e.to_string()))?;
    Ok(redact_config(value))
}

async fn config_history(state: &Arc<AppState>) -> Result<Value, RuntimeError> {
    let entries: Vec<Value> = state
        .config
        .history_entries()
        .await
        .into_iter()
        .map(|change| {
            json!({
                "timestamp_millis": change.timestamp_millis,
                "diff": change.diff,
                "success": change.success,
                "error": change.error,
                "triggered_by": change.triggered_by,
            })
        })
        .collect();
    Ok(json!({ "history": entries }))
}

async fn config_rollback(state: &Arc<AppState>, params: &Value) -> Result<Value, RuntimeError> {
    let index = params
        .get("index")
        .and_then(Value::as_u64)
        .ok_or_else(|| RuntimeError::InvalidInput("missing required param \"index\"".to_string()))? as usize;
    state
        .config
        .rollback(index)
        .await
        .ok_or_else(|| RuntimeError::NotFound(format!("no history entry at index {index}")))?;
    Ok(json!({ "rolled_back_to": index }))
}

async fn memory_search(state: &Arc<AppState>, params: &Value) -> Result<Value, RuntimeError> {
    let query = require_str(params, "query")?;
    let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
    let hits = state
        .memory
        .search(&query, SearchOptions { limit, ..Default::default() })
        .await
        .map_err(from_store_error)?;
    let hits: Vec<Value> = hits
        .into_iter()
        .map(|hit| json!({ "record": hit.record, "score": hit.score }))
        .collect();
    Ok(json!({ "hits": hits }))
}

async fn memory_status(state: &Arc<AppState>) -> Result<Value, RuntimeError> {
    let records = state.memory.store().list(MemoryFilter::default()).await.map_err(from_store_error)?;
    Ok(json!({ "record_count": records.len() }))
}

async fn lanes_status(state: &Arc<AppState>) -> Result<Value, RuntimeError> {
    let lanes = state.lanes.status().await;
    Ok(json!({ "lanes": lanes }))
}
