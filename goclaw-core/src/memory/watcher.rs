//! Workspace watcher and session indexer background tasks.
//!
//! Both are independent `tokio` tasks holding a `CancellationToken` for
//! cooperative shutdown, following the same shutdown idiom as
//! `channels::OutboundDispatcher::run`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::MemoryManager;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);
pub const MIN_DEBOUNCE: Duration = Duration::from_millis(1000);
const DAILY_NOTE_CHUNK_CHARS: usize = 500;

fn is_daily_note(name: &str) -> bool {
    let bytes = name.strip_suffix(".md").unwrap_or("").as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => true,
            _ => b.is_ascii_digit(),
        })
}

/// Splits `text` into paragraph-bounded chunks of at most
/// `DAILY_NOTE_CHUNK_CHARS`, joining undersized paragraphs with a blank line.
pub fn chunk_paragraphs(text: &str) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect();
    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in paragraphs {
        let candidate_len = if current.is_empty() {
            paragraph.len()
        } else {
            current.len() + 2 + paragraph.len()
        };
        if candidate_len > DAILY_NOTE_CHUNK_CHARS && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        if paragraph.len() > DAILY_NOTE_CHUNK_CHARS {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            for slice in paragraph.as_bytes().chunks(DAILY_NOTE_CHUNK_CHARS) {
                chunks.push(String::from_utf8_lossy(slice).into_owned());
            }
        } else {
            current.push_str(paragraph);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn debounced_clamp(debounce: Duration) -> Duration {
    debounce.max(MIN_DEBOUNCE)
}

/// Watches `workspace_dir` for any filesystem event and, after a debounce
/// window, runs an atomic reindex over `MEMORY.md` and daily notes.
pub fn spawn_workspace_watcher(
    manager: Arc<MemoryManager>,
    workspace_dir: PathBuf,
    debounce: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let debounce = debounced_clamp(debounce);
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let watch_dir = workspace_dir.clone();
        let _watcher_guard = tokio::task::spawn_blocking(move || -> Option<RecommendedWatcher> {
            let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if res.is_ok() {
                    let _ = tx.send(());
                }
            }) {
                Ok(w) => w,
                Err(e) => {
                    warn!(error = %e, "failed to start workspace watcher");
                    return None;
                }
            };
            if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::Recursive) {
                warn!(error = %e, path = %watch_dir.display(), "failed to watch workspace dir");
                return None;
            }
            Some(watcher)
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                maybe = rx.recv() => {
                    if maybe.is_none() {
                        return;
                    }
                    // drain any events that arrived during the debounce window
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(debounce) => {}
                    }
                    while rx.try_recv().is_ok() {}
                    if let Err(e) = run_workspace_reindex(&manager, &workspace_dir).await {
                        warn!(error = %e, "workspace reindex failed");
                    }
                }
            }
        }
    })
}

/// One-shot scan-and-reindex over `workspace_dir`, exactly as a watcher-driven
/// run would perform it. Used by the `memory index` CLI command.
pub async fn run_workspace_reindex(
    manager: &Arc<MemoryManager>,
    workspace_dir: &Path,
) -> Result<(), super::store::StoreError> {
    let mut sources = Vec::new();
    let memory_md = workspace_dir.join("MEMORY.md");
    if memory_md.is_file() {
        sources.push(memory_md);
    }
    if let Ok(entries) = std::fs::read_dir(workspace_dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if is_daily_note(name) {
                    sources.push(entry.path());
                }
            }
        }
    }

    let mut chunks: Vec<(String, String, String)> = Vec::new(); // (source, kind, text)
    for path in sources {
        let Ok(text) = std::fs::read_to_string(&path) else { continue };
        let label = path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown").to_string();
        let kind = if label == "MEMORY.md" { "memory_index" } else { "daily_note" };
        for chunk in chunk_paragraphs(&text) {
            chunks.push((label.clone(), kind.to_string(), chunk));
        }
    }

    manager.reindex_workspace(chunks).await
}

/// Scans session journals under `sessions_dir`, indexing files modified within
/// `retention_days`, incrementally re-indexing only files whose mtime advanced
/// since the last pass.
pub fn spawn_session_indexer(
    manager: Arc<MemoryManager>,
    sessions_dir: PathBuf,
    retention_days: i64,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_indexed: HashMap<PathBuf, SystemTime> = HashMap::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(poll_interval) => {}
            }
            if let Err(e) = index_pass(&manager, &sessions_dir, retention_days, &mut last_indexed).await {
                warn!(error = %e, "session indexer pass failed");
            }
        }
    })
}

async fn index_pass(
    manager: &Arc<MemoryManager>,
    sessions_dir: &Path,
    retention_days: i64,
    last_indexed: &mut HashMap<PathBuf, SystemTime>,
) -> Result<(), super::store::StoreError> {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs((retention_days.max(0) as u64) * 86_400))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let Ok(entries) = std::fs::read_dir(sessions_dir) else { return Ok(()) };
    for entry in entries.flatten() {
        let path = entry.path();
        // Journal files are named by sanitized session key, no extension;
        // skip in-flight saves and the filename sidecar.
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "index.json" || name.ends_with(".tmp") {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        if modified < cutoff {
            continue;
        }
        if last_indexed.get(&path).is_some_and(|prev| *prev >= modified) {
            continue;
        }

        let Ok(contents) = std::fs::read_to_string(&path) else { continue };
        let texts = extract_indexable_text(&contents);
        if !texts.is_empty() {
            let label = path.file_name().and_then(|n| n.to_str()).unwrap_or("session").to_string();
            manager.index_session_texts(&label, texts).await?;
        }
        last_indexed.insert(path, modified);
    }
    Ok(())
}

/// Per-line extraction: each JSONL line is a message object; pulls text from a
/// `content` string, or concatenates `type=text` blocks from a structured
/// content array.
fn extract_indexable_text(jsonl: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in jsonl.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else { continue };
        let Some(content) = value.get("content") else { continue };
        match content {
            serde_json::Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
            serde_json::Value::Array(blocks) => {
                let mut joined = String::new();
                for block in blocks {
                    if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                        if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                            if !joined.is_empty() {
                                joined.push('\n');
                            }
                            joined.push_str(text);
                        }
                    }
                }
                if !joined.trim().is_empty() {
                    out.push(joined);
                }
            }
            _ => {}
        }
    }
    out
}
