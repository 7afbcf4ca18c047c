use futures_util::StreamExt;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;

use super::common;

#[tokio::test]
async fn e2e_lanes_status_reports_all_lanes() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (mut write, mut read) = ws.split();
    let _connected = common::recv_json(&mut read).await;

    let resp = common::send_and_recv(&mut write, &mut read, &common::rpc(1, "lanes.status", serde_json::json!({})))
        .await;

    assert_eq!(resp["id"], 1);
    let lanes = resp["result"]["lanes"].as_array().unwrap();
    assert!(lanes.iter().any(|l| l["name"] == "main"));
    for lane in lanes {
        assert_eq!(lane["queued"], 0);
        assert_eq!(lane["active"], 0);
    }

    drop(write);
    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
