//! `goclaw gateway ...` subcommands.

use std::path::PathBuf;

use futures_util::{SinkExt, StreamExt};
use goclaw_core::config::{
    default_config_path, default_history_path, ConfigHistory, TriggerSource,
};
use goclaw_core::{Config, ConfigLoader, ConfigRuntime};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{load_config, CommandError};
use crate::run::Runtime;

/// `gateway run`: wire the full runtime and serve until ctrl-c.
pub async fn run(config_path: Option<PathBuf>, addr: Option<String>) -> Result<(), CommandError> {
    let runtime = Runtime::build(config_path).await?;
    runtime.run(addr).await
}

fn health_url(config: &Config) -> String {
    format!("http://{}:{}/health", config.gateway.host, config.gateway.port)
}

fn ws_url(config: &Config) -> String {
    let mut url = format!("ws://{}:{}/ws", config.gateway.host, config.gateway.port);
    if let Some(token) = &config.gateway.token {
        url.push_str(&format!("?token={token}"));
    }
    url
}

async fn fetch_health(config: &Config) -> Result<serde_json::Value, CommandError> {
    let url = health_url(config);
    let response = reqwest::get(&url).await.map_err(|e| format!("GET {url}: {e}"))?;
    Ok(response.json().await?)
}

/// `gateway health`: one-line liveness probe.
pub async fn health(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    let body = fetch_health(&config).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// `gateway status`: the same probe, formatted for humans.
pub async fn status(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    match fetch_health(&config).await {
        Ok(body) => {
            println!("gateway: running at {}:{}", config.gateway.host, config.gateway.port);
            if let Some(version) = body.get("version").and_then(|v| v.as_str()) {
                println!("version: {version}");
            }
            if let Some(uptime) = body.get("uptime_secs").and_then(|v| v.as_u64()) {
                println!("uptime:  {uptime}s");
            }
            Ok(())
        }
        Err(e) => {
            println!("gateway: not reachable at {}:{}", config.gateway.host, config.gateway.port);
            Err(e)
        }
    }
}

/// `gateway probe`: connect over WebSocket, confirm the `connected`
/// notification, and run one `lanes.status` round-trip.
pub async fn probe(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    let url = ws_url(&config);
    let (ws, _) = connect_async(&url).await.map_err(|e| format!("connect {url}: {e}"))?;
    let (mut write, mut read) = ws.split();

    let connected = read.next().await.ok_or("connection closed before any frame")??;
    let connected: serde_json::Value = serde_json::from_str(connected.to_text()?)?;
    let session_id = connected["params"]["session_id"].as_str().unwrap_or("?");
    println!("connected: session {session_id}");

    let request = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "lanes.status", "params": {} });
    write.send(Message::Text(request.to_string())).await?;
    let response = read.next().await.ok_or("connection closed before the response")??;
    let response: serde_json::Value = serde_json::from_str(response.to_text()?)?;
    match response.get("result") {
        Some(result) => {
            println!("lanes: {}", serde_json::to_string(result)?);
            Ok(())
        }
        None => Err(format!("probe failed: {response}").into()),
    }
}

/// The service lifecycle commands delegate to the operating system's own
/// manager; this build intentionally ships without an installer.
pub fn service_stub() {
    println!("Service install/uninstall/start/stop/restart are not built into this binary.");
    println!("Run the gateway in the foreground with `goclaw gateway run`, and use your");
    println!("service manager of choice (systemd, launchd, ...) to supervise it.");
}

/// `gateway reload`: re-load + re-validate the file and record the attempt,
/// exactly as the watcher would.
pub async fn reload(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let loader = match &config_path {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let runtime = ConfigRuntime::new(loader, default_history_path()).await?;
    runtime.reload(TriggerSource::Manual).await?;
    println!("config reloaded and validated; attempt recorded in history");
    Ok(())
}

/// `gateway history`: print the recorded reload attempts, oldest first.
pub fn history() -> Result<(), CommandError> {
    let history = ConfigHistory::load(default_history_path())?;
    if history.entries().is_empty() {
        println!("no config history recorded yet");
        return Ok(());
    }
    for (index, entry) in history.entries().iter().enumerate() {
        let when = chrono::DateTime::from_timestamp_millis(entry.timestamp_millis)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| entry.timestamp_millis.to_string());
        let outcome = if entry.success { "ok" } else { "failed" };
        let changed: Vec<&str> = entry.diff.keys().map(String::as_str).collect();
        println!(
            "[{index}] {when} {outcome} ({:?}) changed: {}",
            entry.triggered_by,
            if changed.is_empty() { "-".to_string() } else { changed.join(", ") }
        );
        if let Some(error) = &entry.error {
            println!("      error: {error}");
        }
    }
    Ok(())
}

/// `gateway rollback [index]`: write a recorded snapshot back to the config
/// file; the watcher (or a manual reload) then applies it.
pub fn rollback(config_path: Option<PathBuf>, index: Option<usize>) -> Result<(), CommandError> {
    let history = ConfigHistory::load(default_history_path())?;
    let snapshot = match index {
        Some(index) => history
            .rollback(index)
            .ok_or_else(|| format!("no history entry at index {index}"))?,
        None => history
            .rollback_to_latest()
            .ok_or("no successful reload recorded to roll back to")?,
    };

    let target = config_path.unwrap_or_else(default_config_path);
    write_config_atomically(&target, &snapshot)?;
    println!("rolled back config written to {}", target.display());
    Ok(())
}

/// Same `.tmp`-then-rename idiom the session journal uses, so a crash
/// mid-rollback never leaves a torn config file.
fn write_config_atomically(target: &std::path::Path, config: &Config) -> Result<(), CommandError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = target.with_extension("json.tmp");
    let contents = serde_json::to_string_pretty(config)?;
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, target)?;
    Ok(())
}
