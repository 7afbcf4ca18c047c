use futures_util::StreamExt;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_session_get_then_clear_roundtrip() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (mut write, mut read) = ws.split();
    let _connected = common::recv_json(&mut read).await;

    let key = "agent:main:telegram:1:group:42";

    let get_resp =
        common::send_and_recv(&mut write, &mut read, &common::rpc(1, "session.get", serde_json::json!({ "key": key }))).await;
    assert_eq!(get_resp["result"]["key"], key);
    assert_eq!(get_resp["result"]["generation"], 0);

    let list_resp = common::send_and_recv(&mut write, &mut read, &common::rpc(2, "session.list", serde_json::json!({}))).await;
    let sessions = list_resp["result"]["sessions"].as_array().unwrap();
    assert!(sessions.iter().any(|s| s == key));

    let clear_resp =
        common::send_and_recv(&mut write, &mut read, &common::rpc(3, "session.clear", serde_json::json!({ "key": key }))).await;
    assert_eq!(clear_resp["result"]["generation"], 1);

    drop(write);
    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}

#[tokio::test]
async fn e2e_session_get_missing_key_param_is_invalid_input() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (mut write, mut read) = ws.split();
    let _connected = common::recv_json(&mut read).await;

    let resp = common::send_and_recv(&mut write, &mut read, &common::rpc(1, "session.get", serde_json::json!({}))).await;
    assert_eq!(resp["error"]["code"], -31001);

    drop(write);
    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
