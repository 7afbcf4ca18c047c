//! WebSocket connection lifecycle: send the `connected` notification, then
//! multiplex three sources until the socket closes: incoming JSON-RPC
//! requests, agent-stream bus events (forwarded as `agent.event`
//! notifications), and outbound `ws`-channel messages routed here by the
//! dispatcher (forwarded as `message` notifications).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use goclaw_core::bus::{AgentEvent, BusEvent, Topic};
use serde_json::json;
use stream_event::{EnvelopeState, ProtocolEvent};
use uuid::Uuid;

use crate::app::AppState;
use crate::response::{send_notification, send_response};
use crate::rpc::{connected_notification, dispatch, parse_error, Notification, RpcRequest};

/// Splits a bus agent event into the session it belongs to and its wire shape.
fn bridge_agent_event(event: AgentEvent) -> (String, ProtocolEvent) {
    match event {
        AgentEvent::Lifecycle { session_key, phase } => (session_key, ProtocolEvent::Lifecycle { phase }),
        AgentEvent::Tool { session_key, name, arguments, result } => {
            (session_key, ProtocolEvent::Tool { name, arguments, result })
        }
        AgentEvent::Assistant { session_key, delta, done } => {
            (session_key, ProtocolEvent::Assistant { delta, done })
        }
        AgentEvent::Error { session_key, reason, message } => {
            (session_key, ProtocolEvent::Error { reason, message })
        }
        AgentEvent::Compaction { session_key, removed } => {
            (session_key, ProtocolEvent::Compaction { removed })
        }
    }
}

pub(crate) async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();

    // Register before announcing the session id: a client may address this
    // connection the moment it reads the `connected` notification.
    let mut agent_events = state.bus.subscribe(Topic::AgentEvent);
    let mut outbound = state.ws_adapter.register(&session_id);
    let mut envelope = EnvelopeState::new();

    if send_notification(&mut socket, &connected_notification(&session_id)).await.is_err() {
        state.ws_adapter.unregister(&session_id);
        return;
    }

    loop {
        tokio::select! {
            received = socket.recv() => {
                let Some(received) = received else { break };
                let msg = match received {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket read error, closing");
                        let _ = socket.close().await;
                        break;
                    }
                };
                let text = match msg {
                    Message::Text(t) => t,
                    Message::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
                    Message::Close(_) => break,
                    _ => continue,
                };

                let response = match serde_json::from_str::<RpcRequest>(&text) {
                    Ok(req) => dispatch(req, &state, &session_id).await,
                    Err(e) => parse_error(format!("parse error: {e}")),
                };

                if send_response(&mut socket, &response).await.is_err() {
                    break;
                }
            }
            event = agent_events.recv() => {
                let Some(BusEvent::Agent(event)) = event else { break };
                let (session_key, protocol_event) = bridge_agent_event(event);
                let params = match stream_event::to_json(&protocol_event, &session_key, &mut envelope) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize agent event");
                        continue;
                    }
                };
                let notification = Notification { jsonrpc: "2.0", method: "agent.event", params };
                if send_notification(&mut socket, &notification).await.is_err() {
                    break;
                }
            }
            delivered = outbound.recv() => {
                let Some(message) = delivered else { break };
                let notification = Notification {
                    jsonrpc: "2.0",
                    method: "message",
                    params: json!({
                        "id": message.id,
                        "chat_id": message.chat_id,
                        "content": message.content,
                        "is_stream": message.is_stream,
                        "reply_to": message.reply_to,
                        "timestamp": message.timestamp,
                    }),
                };
                if send_notification(&mut socket, &notification).await.is_err() {
                    break;
                }
            }
        }
    }

    state.ws_adapter.unregister(&session_id);
}
