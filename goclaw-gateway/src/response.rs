//! Send a single JSON-RPC response or notification as a WebSocket text frame.

use axum::extract::ws::{Message, WebSocket};

use crate::rpc::{Notification, RpcResponse};

pub(crate) async fn send_response(socket: &mut WebSocket, response: &RpcResponse) -> Result<(), axum::Error> {
    let json = serde_json::to_string(response).unwrap_or_else(|_| {
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-31010,"message":"serialization error"}}"#.to_string()
    });
    socket.send(Message::Text(json)).await
}

pub(crate) async fn send_notification(socket: &mut WebSocket, notification: &Notification) -> Result<(), axum::Error> {
    let json = serde_json::to_string(notification).unwrap_or_default();
    socket.send(Message::Text(json)).await
}
