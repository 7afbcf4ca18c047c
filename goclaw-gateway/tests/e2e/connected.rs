use futures_util::StreamExt;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_connect_sends_connected_notification_first() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (_write, mut read) = ws.split();

    let notification = common::recv_json(&mut read).await;
    assert_eq!(notification["method"], "connected");
    assert!(notification["params"]["session_id"].is_string());
    assert!(notification.get("id").is_none());

    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
