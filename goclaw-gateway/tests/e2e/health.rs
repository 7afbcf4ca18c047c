use super::common;

#[tokio::test]
async fn e2e_health_reports_status_ok() {
    let (_ws_url, health_url, server_handle, _dir) = common::spawn_gateway(None).await;

    let body: serde_json::Value = reqwest::get(&health_url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert!(body["uptime_secs"].is_number());

    server_handle.abort();
}
