use futures_util::{SinkExt, StreamExt};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::common;

#[tokio::test]
async fn e2e_invalid_json_returns_parse_error() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (mut write, mut read) = ws.split();

    let _connected = common::recv_json(&mut read).await;

    write.send(Message::Text("not valid json".to_string())).await.unwrap();
    let resp = common::recv_json(&mut read).await;

    assert!(resp["result"].is_null());
    assert!(resp["error"]["message"].as_str().unwrap().contains("parse error"));
    assert_eq!(resp["id"], serde_json::Value::Null);

    drop(write);
    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
