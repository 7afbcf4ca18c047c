//! Agent-stream forwarding: bus `agent-event` traffic reaches connected
//! clients as `agent.event` notifications, `chat.send` publishes inbound
//! traffic, and `ws`-channel outbound messages come back as `message`
//! notifications on the originating connection.

use futures_util::StreamExt;
use goclaw_core::bus::{AgentEvent, BusEvent, OutboundMessage, Topic};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_bus_agent_event_arrives_as_notification_with_envelope() {
    let (ws_url, _health, bus, server_handle, _dir) = common::spawn_gateway_with_bus(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (_write, mut read) = ws.split();
    let _connected = common::recv_json(&mut read).await;

    bus.publish(
        Topic::AgentEvent,
        BusEvent::Agent(AgentEvent::Assistant {
            session_key: "agent:main:telegram:group:42".into(),
            delta: "hello".into(),
            done: true,
        }),
    );

    let notification = common::recv_json(&mut read).await;
    assert_eq!(notification["method"], "agent.event");
    assert_eq!(notification["params"]["stream"], "assistant");
    assert_eq!(notification["params"]["delta"], "hello");
    assert_eq!(notification["params"]["session_key"], "agent:main:telegram:group:42");
    assert_eq!(notification["params"]["event_id"], 1);

    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}

#[tokio::test]
async fn e2e_chat_send_publishes_inbound_on_the_ws_channel() {
    let (ws_url, _health, bus, server_handle, _dir) = common::spawn_gateway_with_bus(None).await;
    let mut inbound = bus.subscribe(Topic::Inbound);

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (mut write, mut read) = ws.split();
    let connected = common::recv_json(&mut read).await;
    let session_id = connected["params"]["session_id"].as_str().unwrap().to_string();

    let resp = common::send_and_recv(
        &mut write,
        &mut read,
        &common::rpc(1, "chat.send", serde_json::json!({ "content": "hello agent" })),
    )
    .await;
    assert_eq!(resp["result"]["published"], true);

    let event = timeout(Duration::from_secs(5), inbound.recv()).await.unwrap().unwrap();
    match event {
        BusEvent::Inbound(m) => {
            assert_eq!(m.channel, "ws");
            assert_eq!(m.chat_id, session_id);
            assert_eq!(m.content, "hello agent");
        }
        other => panic!("expected inbound event, got {other:?}"),
    }

    drop(write);
    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}

#[tokio::test]
async fn e2e_ws_outbound_is_delivered_to_the_originating_connection() {
    let (ws_url, _health, bus, server_handle, _dir) = common::spawn_gateway_with_bus(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (_write, mut read) = ws.split();
    let connected = common::recv_json(&mut read).await;
    let session_id = connected["params"]["session_id"].as_str().unwrap().to_string();

    // The harness runs an outbound dispatcher over the gateway's channel
    // registry, so this routes through the registered WsAdapter.
    bus.publish(
        Topic::Outbound,
        BusEvent::Outbound(OutboundMessage {
            id: "m-1".into(),
            channel: "ws".into(),
            account_id: Some("gateway".into()),
            chat_id: session_id.clone(),
            content: "final reply".into(),
            media: Vec::new(),
            reply_to: None,
            is_stream: false,
            chat_state: None,
            timestamp: chrono::Utc::now(),
        }),
    );

    let notification = common::recv_json(&mut read).await;
    assert_eq!(notification["method"], "message");
    assert_eq!(notification["params"]["content"], "final reply");
    assert_eq!(notification["params"]["chat_id"], session_id);

    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
