//! Memory Engine: SQLite-backed semantic + full-text memory search
//! with an embedding cache, batch/failover-aware embedding, post-search
//! deduplication, and two background indexers.
//!
//! [`MemoryManager`] is the facade: it owns the [`SqliteMemoryStore`], an
//! optional [`Embedder`], and a [`Deduplicator`], and is the only thing
//! callers interact with; the submodules below are implementation detail.

mod dedup;
mod embedder;
mod openai_embedder;
mod store;
mod watcher;

pub use dedup::Deduplicator;
pub use embedder::{Embedder, EmbeddingError, FailoverEmbedder, MockEmbedder};
pub use openai_embedder::OpenAIEmbedder;
pub use store::{
    derive_id, sha256_hex, MemoryFilter, MemoryRecord, SearchHit, SearchOptions, SqliteMemoryStore,
    StoreError, VectorStore,
};
use store::vector_to_json;
pub use watcher::{chunk_paragraphs, run_workspace_reindex, spawn_session_indexer, spawn_workspace_watcher};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Guards against too-frequent reindex rebuilds.
pub const DEFAULT_REINDEX_MIN_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default session-journal retention for the session indexer.
pub const DEFAULT_SESSION_RETENTION_DAYS: i64 = 30;
const SESSION_INDEXER_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Ties the store, embedder, and dedup pass together.
pub struct MemoryManager {
    store: Arc<SqliteMemoryStore>,
    embedder: Option<Arc<dyn Embedder>>,
    dedup: Deduplicator,
    min_reindex_interval: Duration,
    last_reindex: Mutex<Option<Instant>>,
    reindexing: AtomicBool,
}

impl MemoryManager {
    pub fn new(store: Arc<SqliteMemoryStore>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            store,
            embedder,
            dedup: Deduplicator::default(),
            min_reindex_interval: DEFAULT_REINDEX_MIN_INTERVAL,
            last_reindex: Mutex::new(None),
            reindexing: AtomicBool::new(false),
        }
    }

    pub fn with_dedup(mut self, dedup: Deduplicator) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_min_reindex_interval(mut self, interval: Duration) -> Self {
        self.min_reindex_interval = interval;
        self
    }

    pub fn store(&self) -> &Arc<SqliteMemoryStore> {
        &self.store
    }

    /// Embeds one text, consulting the cache first. Returns `None` when no
    /// embedder is configured.
    async fn embed_one(&self, text: &str) -> Result<Option<Vec<f32>>, StoreError> {
        let Some(embedder) = &self.embedder else { return Ok(None) };
        let hash = sha256_hex(text);
        if let Some(cached) = self.store.cache_get(&hash).await? {
            return Ok(Some(cached));
        }
        let vectors = embedder
            .embed(&[text])
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            StoreError::Storage("embedder returned no vector for single input".into())
        })?;
        self.store.cache_put(&hash, &vector).await?;
        Ok(Some(vector))
    }

    /// Embeds many texts, chunked to the embedder's `max_batch_size`, cache
    /// checked per item before each chunk's provider call, falling back to
    /// per-item embedding for a chunk that fails as a whole.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, StoreError> {
        let Some(embedder) = &self.embedder else {
            return Ok(vec![None; texts.len()]);
        };

        let mut hashes = Vec::with_capacity(texts.len());
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut to_fetch: Vec<usize> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let hash = sha256_hex(text);
            match self.store.cache_get(&hash).await? {
                Some(cached) => results.push(Some(cached)),
                None => {
                    results.push(None);
                    to_fetch.push(i);
                }
            }
            hashes.push(hash);
        }

        let batch_size = embedder.max_batch_size().max(1);
        for chunk_indices in to_fetch.chunks(batch_size) {
            let chunk_texts: Vec<&str> = chunk_indices.iter().map(|&i| texts[i].as_str()).collect();
            match embedder.embed(&chunk_texts).await {
                Ok(vectors) => {
                    for (&idx, vector) in chunk_indices.iter().zip(vectors) {
                        self.store.cache_put(&hashes[idx], &vector).await?;
                        results[idx] = Some(vector);
                    }
                }
                Err(batch_err) => {
                    // Batch failed as a whole; fall back to embedding this chunk
                    // one item at a time.
                    for &idx in chunk_indices {
                        match embedder.embed(&[texts[idx].as_str()]).await {
                            Ok(vectors) => {
                                if let Some(vector) = vectors.into_iter().next() {
                                    self.store.cache_put(&hashes[idx], &vector).await?;
                                    results[idx] = Some(vector);
                                }
                            }
                            Err(item_err) => {
                                return Err(StoreError::Storage(format!(
                                    "batch embedding failed ({batch_err}); per-item fallback also failed for item {idx} ({item_err})"
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(results)
    }

    /// Adds one memory entry, embedding it first if an embedder is configured.
    pub async fn add(
        &self,
        source: impl Into<String>,
        kind: impl Into<String>,
        text: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError> {
        let source = source.into();
        let kind = kind.into();
        let text = text.into();
        let vector = self.embed_one(&text).await?;
        let now = chrono::Utc::now().timestamp_millis();
        let record = MemoryRecord {
            id: derive_id(&source, &kind, &text),
            text,
            dimension: vector.as_ref().map(|v| v.len()).unwrap_or(0),
            source,
            kind,
            metadata,
            created_at_millis: now,
            updated_at_millis: now,
        };
        let id = record.id.clone();
        self.store.add(record, vector).await?;
        Ok(id)
    }

    /// Batch-adds memory entries labeled by a common `(source, kind)` pair
    /// (used by the workspace watcher and session indexer).
    pub async fn add_batch_labeled(
        &self,
        source: &str,
        kind: &str,
        texts: Vec<String>,
    ) -> Result<(), StoreError> {
        if texts.is_empty() {
            return Ok(());
        }
        let vectors = self.embed_batch(&texts).await?;
        let now = chrono::Utc::now().timestamp_millis();
        let items = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| {
                let record = MemoryRecord {
                    id: derive_id(source, kind, &text),
                    dimension: vector.as_ref().map(|v| v.len()).unwrap_or(0),
                    text,
                    source: source.to_string(),
                    kind: kind.to_string(),
                    metadata: serde_json::Map::new(),
                    created_at_millis: now,
                    updated_at_millis: now,
                };
                (record, vector)
            })
            .collect();
        self.store.add_batch(items).await
    }

    /// Embeds the query and runs vector search when an embedder is configured,
    /// otherwise falls back to FTS; dedupes the result set before returning.
    pub async fn search(&self, query: &str, mut opts: SearchOptions) -> Result<Vec<SearchHit>, StoreError> {
        let vector = self.embed_one(query).await?;
        if vector.is_none() {
            opts.query_text = Some(query.to_string());
        }
        let hits = self.store.search(vector, opts).await?;
        Ok(self.dedup.dedupe(hits))
    }

    /// Atomic reindex: rejects re-entrant or too-frequent runs, then swaps in
    /// a freshly populated `memories` table containing exactly `entries`
    /// (each `(source, kind, text)`).
    pub async fn reindex_workspace(
        &self,
        entries: Vec<(String, String, String)>,
    ) -> Result<(), StoreError> {
        if self
            .reindexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let result = self.reindex_workspace_inner(entries).await;
        self.reindexing.store(false, Ordering::SeqCst);
        result
    }

    async fn reindex_workspace_inner(
        &self,
        entries: Vec<(String, String, String)>,
    ) -> Result<(), StoreError> {
        {
            let mut last = self.last_reindex.lock().await;
            if let Some(last_run) = *last {
                if last_run.elapsed() < self.min_reindex_interval {
                    return Ok(());
                }
            }
            *last = Some(Instant::now());
        }

        let texts: Vec<String> = entries.iter().map(|(_, _, text)| text.clone()).collect();
        let vectors = self.embed_batch(&texts).await?;
        let now = chrono::Utc::now().timestamp_millis();
        let rows: Vec<(String, String, usize, String, String, i64, i64, Option<Vec<f32>>)> = entries
            .into_iter()
            .zip(vectors)
            .map(|((source, kind, text), vector)| {
                let id = derive_id(&source, &kind, &text);
                let dimension = vector.as_ref().map(|v| v.len()).unwrap_or(0);
                (id, text, dimension, source, kind, now, now, vector)
            })
            .collect();

        self.store
            .atomic_reindex(move |conn, temp_table, temp_vec_table| {
                for (id, text, dimension, source, kind, created_at, updated_at, vector) in rows {
                    conn.execute(
                        &format!(
                            "INSERT INTO {temp_table} (id, text, dimension, source, kind, metadata, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, '{{}}', ?6, ?7)"
                        ),
                        rusqlite::params![id, text, dimension as i64, source, kind, created_at, updated_at],
                    )
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
                    if let Some(vector) = vector {
                        let rowid = conn.last_insert_rowid();
                        conn.execute(
                            &format!("INSERT INTO {temp_vec_table} (rowid, embedding) VALUES (?1, ?2)"),
                            rusqlite::params![rowid, vector_to_json(&vector)],
                        )
                        .map_err(|e| StoreError::Storage(e.to_string()))?;
                    }
                }
                Ok(())
            })
            .await
    }

    /// Indexes per-source extracted session text under `(source="session:<label>",
    /// kind="session_message")`.
    pub async fn index_session_texts(&self, label: &str, texts: Vec<String>) -> Result<(), StoreError> {
        self.add_batch_labeled(&format!("session:{label}"), "session_message", texts).await
    }

    /// Starts the workspace watcher and session indexer background tasks
    ///. Returns their join handles; callers hold `cancel` to stop
    /// both cooperatively.
    pub fn spawn_watchers(
        self: &Arc<Self>,
        workspace_dir: std::path::PathBuf,
        sessions_dir: std::path::PathBuf,
        cancel: CancellationToken,
    ) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let workspace_handle = spawn_workspace_watcher(
            self.clone(),
            workspace_dir,
            watcher::DEFAULT_DEBOUNCE,
            cancel.clone(),
        );
        let session_handle = spawn_session_indexer(
            self.clone(),
            sessions_dir,
            DEFAULT_SESSION_RETENTION_DAYS,
            SESSION_INDEXER_POLL_INTERVAL,
            cancel,
        );
        (workspace_handle, session_handle)
    }
}
