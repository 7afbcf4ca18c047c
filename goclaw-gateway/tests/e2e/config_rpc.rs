use futures_util::StreamExt;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_config_show_redacts_secrets() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (mut write, mut read) = ws.split();
    let _connected = common::recv_json(&mut read).await;

    let resp = common::send_and_recv(&mut write, &mut read, &common::rpc(1, "config.show", serde_json::json!({}))).await;
    assert_eq!(resp["result"]["gateway"]["host"], "127.0.0.1");
    assert!(resp["result"]["gateway"]["token"].is_null());

    drop(write);
    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}

#[tokio::test]
async fn e2e_config_rollback_unknown_index_is_not_found() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (mut write, mut read) = ws.split();
    let _connected = common::recv_json(&mut read).await;

    let resp =
        common::send_and_recv(&mut write, &mut read, &common::rpc(1, "config.rollback", serde_json::json!({ "index": 99 })))
            .await;
    assert_eq!(resp["error"]["code"], -31002);

    drop(write);
    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
