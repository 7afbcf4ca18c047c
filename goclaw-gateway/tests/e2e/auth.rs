use futures_util::StreamExt;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use super::common;

#[tokio::test]
async fn e2e_missing_token_closes_with_4001() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(Some("secret-token".to_string())).await;

    let (ws, _) = connect_async(&ws_url).await.unwrap();
    let (_write, mut read) = ws.split();

    let msg = timeout(Duration::from_secs(5), read.next()).await.unwrap().unwrap().unwrap();
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::from(4001)),
        other => panic!("expected a close frame with code 4001, got {other:?}"),
    }

    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}

#[tokio::test]
async fn e2e_valid_token_in_query_param_is_accepted() {
    let (ws_url, _health_url, server_handle, _dir) = common::spawn_gateway(Some("secret-token".to_string())).await;
    let authed_url = format!("{ws_url}?token=secret-token");

    let (ws, _) = connect_async(&authed_url).await.unwrap();
    let (_write, mut read) = ws.split();

    let notification = common::recv_json(&mut read).await;
    assert_eq!(notification["method"], "connected");

    drop(read);
    server_handle.abort();
    let _ = timeout(Duration::from_secs(5), server_handle).await;
}
