//! `goclaw memory ...` subcommands.

use std::path::PathBuf;
use std::sync::Arc;

use goclaw_core::config::default_data_root;
use goclaw_core::memory::{run_workspace_reindex, Embedder, MemoryFilter, OpenAIEmbedder, SearchOptions, VectorStore};
use goclaw_core::{Config, MemoryManager, SqliteMemoryStore};

use super::{load_config, CommandError};

fn store_path() -> PathBuf {
    default_data_root().join("memory").join("store.db")
}

fn workspace_memory_dir(config: &Config) -> PathBuf {
    let root = &config.workspace.root;
    let expanded = match (root.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(root),
    };
    expanded.join("memory")
}

fn open_manager(config: &Config) -> Result<Arc<MemoryManager>, CommandError> {
    let path = store_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteMemoryStore::new(&path, config.memory.dimension)?);
    let embedder: Option<Arc<dyn Embedder>> = match config.memory.embedder.as_deref() {
        Some("openai") => Some(Arc::new(OpenAIEmbedder::new("text-embedding-3-small"))),
        _ => None,
    };
    Ok(Arc::new(MemoryManager::new(store, embedder)))
}

/// `memory status`: record count and enablement.
pub async fn status(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    let manager = open_manager(&config)?;
    let records = manager.store().list(MemoryFilter::default()).await?;
    println!("enabled: {}", config.memory.enabled);
    println!("records: {}", records.len());
    println!("store:   {}", store_path().display());
    Ok(())
}

/// `memory index`: one watcher-equivalent rebuild over the workspace.
pub async fn index(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    let manager = open_manager(&config)?;
    let dir = workspace_memory_dir(&config);
    if !dir.is_dir() {
        return Err(format!("workspace memory directory {} does not exist", dir.display()).into());
    }
    run_workspace_reindex(&manager, &dir).await?;
    let records = manager.store().list(MemoryFilter::default()).await?;
    println!("reindexed {} from {}", records.len(), dir.display());
    Ok(())
}

/// `memory search <query>`.
pub async fn search(config_path: Option<PathBuf>, query: &str, limit: usize) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    let manager = open_manager(&config)?;
    let hits = manager.search(query, SearchOptions { limit, ..Default::default() }).await?;
    if hits.is_empty() {
        println!("no matches");
        return Ok(());
    }
    for hit in hits {
        let mut text = hit.record.text.replace('\n', " ");
        if text.chars().count() > 96 {
            text = text.chars().take(93).collect::<String>() + "...";
        }
        println!("{:.3}  [{}] {}", hit.score, hit.record.source, text);
    }
    Ok(())
}

/// `memory backend`: which store and embedder this config resolves to.
pub async fn backend(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    println!("backend:   sqlite ({})", store_path().display());
    println!("dimension: {}", config.memory.dimension);
    match config.memory.embedder.as_deref() {
        Some(name) => println!("embedder:  {name}"),
        None => println!("embedder:  none (full-text search only)"),
    }
    println!("workspace: {}", workspace_memory_dir(&config).display());
    Ok(())
}
