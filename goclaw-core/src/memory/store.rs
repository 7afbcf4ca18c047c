//! SQLite-backed vector + full-text store.
//!
//! Dual-table design: a `memories` table holds metadata and text, a `vec0`
//! virtual table holds embeddings keyed by the same rowid, and an FTS5 virtual
//! table mirrors `text` for the no-embedder search path. All three are kept in
//! sync on every write.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store is closed")]
    Closed,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One stored memory entry; the vector itself lives in the companion table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
    pub dimension: usize,
    pub source: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at_millis: i64,
    pub updated_at_millis: i64,
}

/// Content-derived, collision-free id:
/// `sha256(source || "\0" || kind || "\0" || text)`, hex-encoded.
pub fn derive_id(source: &str, kind: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone, Debug, Default)]
pub struct MemoryFilter {
    pub source: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f32,
    pub filters: MemoryFilter,
    /// Raw query text, used by the FTS fallback path when no vector is given.
    pub query_text: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.0,
            filters: MemoryFilter::default(),
            query_text: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchHit {
    pub record: MemoryRecord,
    pub score: f32,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Formats a vector as JSON text, the input format sqlite-vec's `vec0` expects
/// for both inserts and `MATCH` queries.
pub(super) fn vector_to_json(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Store contract: `Add`, `AddBatch`, `Get`, `Update`, `Delete`,
/// `List(filter)`, `Search(vector, opts) -> results`, `Close`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, record: MemoryRecord, vector: Option<Vec<f32>>) -> Result<(), StoreError>;
    async fn add_batch(
        &self,
        items: Vec<(MemoryRecord, Option<Vec<f32>>)>,
    ) -> Result<(), StoreError>;
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, StoreError>;
    async fn update(
        &self,
        id: &str,
        text: Option<String>,
        vector: Option<Vec<f32>>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn list(&self, filter: MemoryFilter) -> Result<Vec<MemoryRecord>, StoreError>;
    async fn search(
        &self,
        vector: Option<Vec<f32>>,
        opts: SearchOptions,
    ) -> Result<Vec<SearchHit>, StoreError>;
    async fn close(&self) -> Result<(), StoreError>;
}

/// SQLite-backed implementation. Every operation opens a short-lived connection
/// inside `spawn_blocking` rather than holding one connection behind a mutex.
pub struct SqliteMemoryStore {
    db_path: PathBuf,
    dimension: usize,
    closed: AtomicBool,
}

const VEC_TABLE: &str = "memory_vectors";
const FTS_TABLE: &str = "memories_fts";

impl SqliteMemoryStore {
    pub fn new(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Self::open_raw(&db_path)?;
        Self::create_schema(&conn, dimension)?;
        Ok(Self {
            db_path,
            dimension,
            closed: AtomicBool::new(false),
        })
    }

    fn open_raw(path: &Path) -> Result<rusqlite::Connection, StoreError> {
        // Register the sqlite-vec extension once per process so every
        // connection (including the short-lived per-call ones) sees `vec0`.
        static SQLITE_VEC_INIT: std::sync::Once = std::sync::Once::new();
        SQLITE_VEC_INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        });
        rusqlite::Connection::open(path).map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn create_schema(conn: &rusqlite::Connection, dimension: usize) -> Result<(), StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                text TEXT NOT NULL,
                dimension INTEGER NOT NULL DEFAULT 0,
                source TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_cache (
                hash TEXT PRIMARY KEY,
                vector TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        let create_vec_sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {VEC_TABLE} USING vec0(embedding float[{dimension}])"
        );
        conn.execute(&create_vec_sql, [])
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let create_fts_sql =
            format!("CREATE VIRTUAL TABLE IF NOT EXISTS {FTS_TABLE} USING fts5(id UNINDEXED, text)");
        conn.execute(&create_fts_sql, [])
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Embedding cache lookup by `sha256(text)`.
    pub async fn cache_get(&self, text_hash: &str) -> Result<Option<Vec<f32>>, StoreError> {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        let hash = text_hash.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<f32>>, StoreError> {
            let conn = Self::open_raw(&db_path)?;
            let mut stmt = conn
                .prepare("SELECT vector FROM embedding_cache WHERE hash = ?1")
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let row: Option<String> = stmt
                .query_row(params![hash], |r| r.get(0))
                .ok();
            match row {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    pub async fn cache_put(&self, text_hash: &str, vector: &[f32]) -> Result<(), StoreError> {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        let hash = text_hash.to_string();
        let json = serde_json::to_string(vector)?;
        let now = now_millis();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = Self::open_raw(&db_path)?;
            conn.execute(
                "INSERT OR REPLACE INTO embedding_cache (hash, vector, created_at) VALUES (?1, ?2, ?3)",
                params![hash, json, now],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Atomic reindex via shadow-table swap.
    /// `populate` runs against the fresh temp metadata table and its matching
    /// temp `vec0` table, and must write exclusively to those two: inserting
    /// into the vec table with the *same* rowid as the metadata row it embeds,
    /// via `INSERT INTO <temp_vec_table> (rowid, embedding) VALUES (?, ?)` and
    /// [`vector_to_json`], so an entry's embedding survives the swap.
    pub async fn atomic_reindex<F>(&self, populate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&rusqlite::Connection, &str, &str) -> Result<(), StoreError> + Send + 'static,
    {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        let dimension = self.dimension;
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut conn = Self::open_raw(&db_path)?;
            let nonce = now_millis();
            let temp_table = format!("memories_temp_{nonce}");
            let temp_vec_table = format!("memory_vectors_temp_{nonce}");

            conn.execute(
                &format!(
                    r#"
                    CREATE TABLE {temp_table} (
                        rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                        id TEXT NOT NULL UNIQUE,
                        text TEXT NOT NULL,
                        dimension INTEGER NOT NULL DEFAULT 0,
                        source TEXT NOT NULL DEFAULT '',
                        kind TEXT NOT NULL DEFAULT '',
                        metadata TEXT NOT NULL DEFAULT '{{}}',
                        created_at INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL
                    )
                    "#
                ),
                [],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                &format!("CREATE VIRTUAL TABLE {temp_vec_table} USING vec0(embedding float[{dimension}])"),
                [],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;

            populate(&conn, &temp_table, &temp_vec_table)?;

            // `memories` is a plain table, so a rename is exact and cheap. The
            // `vec0` virtual table module doesn't support `ALTER TABLE RENAME`,
            // so its swap is a fresh create + copy instead, keyed by the same
            // rowids `memories` now carries.
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute("DROP TABLE IF EXISTS memories_old", [])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute("ALTER TABLE memories RENAME TO memories_old", [])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(&format!("ALTER TABLE {temp_table} RENAME TO memories"), [])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute("DROP TABLE memories_old", [])
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            tx.execute(&format!("DROP TABLE {VEC_TABLE}"), [])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(
                &format!("CREATE VIRTUAL TABLE {VEC_TABLE} USING vec0(embedding float[{dimension}])"),
                [],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(
                &format!("INSERT INTO {VEC_TABLE} (rowid, embedding) SELECT rowid, embedding FROM {temp_vec_table}"),
                [],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.execute(&format!("DROP TABLE {temp_vec_table}"), [])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;

            conn.execute(&format!("DROP TABLE IF EXISTS {FTS_TABLE}"), [])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                &format!("CREATE VIRTUAL TABLE {FTS_TABLE} USING fts5(id UNINDEXED, text)"),
                [],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                &format!("INSERT INTO {FTS_TABLE} (id, text) SELECT id, text FROM memories"),
                [],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;

            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    fn row_to_record(
        id: String,
        text: String,
        dimension: i64,
        source: String,
        kind: String,
        metadata: String,
        created_at: i64,
        updated_at: i64,
    ) -> Result<MemoryRecord, StoreError> {
        let metadata = serde_json::from_str(&metadata)?;
        Ok(MemoryRecord {
            id,
            text,
            dimension: dimension.max(0) as usize,
            source,
            kind,
            metadata,
            created_at_millis: created_at,
            updated_at_millis: updated_at,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteMemoryStore {
    async fn add(&self, record: MemoryRecord, vector: Option<Vec<f32>>) -> Result<(), StoreError> {
        self.add_batch(vec![(record, vector)]).await
    }

    async fn add_batch(
        &self,
        items: Vec<(MemoryRecord, Option<Vec<f32>>)>,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut conn = Self::open_raw(&db_path)?;
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            for (record, vector) in items {
                let metadata = serde_json::to_string(&record.metadata)?;
                tx.execute(
                    r#"
                    INSERT INTO memories (id, text, dimension, source, kind, metadata, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(id) DO UPDATE SET
                        text = excluded.text, dimension = excluded.dimension,
                        source = excluded.source, kind = excluded.kind,
                        metadata = excluded.metadata, updated_at = excluded.updated_at
                    "#,
                    params![
                        record.id,
                        record.text,
                        record.dimension as i64,
                        record.source,
                        record.kind,
                        metadata,
                        record.created_at_millis,
                        record.updated_at_millis,
                    ],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;

                let rowid: i64 = tx
                    .query_row("SELECT rowid FROM memories WHERE id = ?1", params![record.id], |r| r.get(0))
                    .map_err(|e| StoreError::Storage(e.to_string()))?;

                tx.execute(
                    &format!("DELETE FROM {VEC_TABLE} WHERE rowid = ?1"),
                    params![rowid],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
                if let Some(v) = vector {
                    tx.execute(
                        &format!("INSERT INTO {VEC_TABLE} (rowid, embedding) VALUES (?1, ?2)"),
                        params![rowid, vector_to_json(&v)],
                    )
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
                }

                tx.execute(
                    &format!("DELETE FROM {FTS_TABLE} WHERE id = ?1"),
                    params![record.id],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
                tx.execute(
                    &format!("INSERT INTO {FTS_TABLE} (id, text) VALUES (?1, ?2)"),
                    params![record.id, record.text],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, StoreError> {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<MemoryRecord>, StoreError> {
            let conn = Self::open_raw(&db_path)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, text, dimension, source, kind, metadata, created_at, updated_at FROM memories WHERE id = ?1",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let record = stmt
                .query_row(params![id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, i64>(6)?,
                        r.get::<_, i64>(7)?,
                    ))
                })
                .ok();
            match record {
                Some((id, text, dim, source, kind, metadata, created_at, updated_at)) => Ok(Some(
                    Self::row_to_record(id, text, dim, source, kind, metadata, created_at, updated_at)?,
                )),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    async fn update(
        &self,
        id: &str,
        text: Option<String>,
        vector: Option<Vec<f32>>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut record = existing;
        if let Some(t) = text {
            record.text = t;
        }
        if let Some(m) = metadata {
            record.metadata = m;
        }
        record.updated_at_millis = now_millis();
        if let Some(v) = &vector {
            record.dimension = v.len();
        }
        self.add(record, vector).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = Self::open_raw(&db_path)?;
            let rowid: Option<i64> = conn
                .query_row("SELECT rowid FROM memories WHERE id = ?1", params![id], |r| r.get(0))
                .ok();
            if let Some(rowid) = rowid {
                conn.execute(&format!("DELETE FROM {VEC_TABLE} WHERE rowid = ?1"), params![rowid])
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
            }
            conn.execute(&format!("DELETE FROM {FTS_TABLE} WHERE id = ?1"), params![id])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute("DELETE FROM memories WHERE id = ?1", params![id])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    async fn list(&self, filter: MemoryFilter) -> Result<Vec<MemoryRecord>, StoreError> {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<MemoryRecord>, StoreError> {
            let conn = Self::open_raw(&db_path)?;
            let mut sql = String::from(
                "SELECT id, text, dimension, source, kind, metadata, created_at, updated_at FROM memories WHERE 1=1",
            );
            if filter.source.is_some() {
                sql.push_str(" AND source = :source");
            }
            if filter.kind.is_some() {
                sql.push_str(" AND kind = :kind");
            }
            sql.push_str(" ORDER BY created_at ASC");
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut named = Vec::new();
            if let Some(s) = &filter.source {
                named.push((":source", s as &dyn rusqlite::ToSql));
            }
            if let Some(k) = &filter.kind {
                named.push((":kind", k as &dyn rusqlite::ToSql));
            }
            let rows = stmt
                .query_map(named.as_slice(), |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, i64>(6)?,
                        r.get::<_, i64>(7)?,
                    ))
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut out = Vec::new();
            for row in rows {
                let (id, text, dim, source, kind, metadata, created_at, updated_at) =
                    row.map_err(|e| StoreError::Storage(e.to_string()))?;
                out.push(Self::row_to_record(id, text, dim, source, kind, metadata, created_at, updated_at)?);
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    async fn search(
        &self,
        vector: Option<Vec<f32>>,
        opts: SearchOptions,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.ensure_open()?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<SearchHit>, StoreError> {
            let conn = Self::open_raw(&db_path)?;
            let mut hits = match &vector {
                Some(query_vector) => {
                    let sql = format!("SELECT rowid, distance FROM {VEC_TABLE} WHERE embedding MATCH ?1 AND k = ?2");
                    let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::Storage(e.to_string()))?;
                    let knn_limit = (opts.limit * 4).max(opts.limit) as i64;
                    let rows = stmt
                        .query_map(params![vector_to_json(query_vector), knn_limit], |r| {
                            Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
                        })
                        .map_err(|e| StoreError::Storage(e.to_string()))?;
                    let mut out = Vec::new();
                    for row in rows {
                        let (rowid, distance) = row.map_err(|e| StoreError::Storage(e.to_string()))?;
                        // vec0 reports squared L2 distance; fold into a (0, 1] cosine-style
                        // score so callers get one consistent descending ordering contract
                        // regardless of search path.
                        let score = 1.0 / (1.0 + distance as f32);
                        if let Some(record) = Self::fetch_by_rowid(&conn, rowid)? {
                            out.push(SearchHit { record, score });
                        }
                    }
                    out
                }
                None => {
                    let query_text = opts.query_text.clone().unwrap_or_default();
                    if query_text.trim().is_empty() {
                        Vec::new()
                    } else {
                        let sql = format!(
                            "SELECT id, bm25({FTS_TABLE}) FROM {FTS_TABLE} WHERE {FTS_TABLE} MATCH ?1 ORDER BY bm25({FTS_TABLE}) LIMIT ?2"
                        );
                        let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::Storage(e.to_string()))?;
                        let rows = stmt
                            .query_map(params![query_text, (opts.limit * 4).max(opts.limit) as i64], |r| {
                                Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
                            })
                            .map_err(|e| StoreError::Storage(e.to_string()))?;
                        let mut out = Vec::new();
                        for row in rows {
                            let (id, bm25) = row.map_err(|e| StoreError::Storage(e.to_string()))?;
                            // bm25() in sqlite is negative and lower-is-better; normalize to
                            // a positive score where higher is better, same ordering contract
                            // as the cosine path above.
                            let score = 1.0 / (1.0 + bm25.abs() as f32);
                            if let Some(conn_record) = conn
                                .query_row(
                                    "SELECT id, text, dimension, source, kind, metadata, created_at, updated_at FROM memories WHERE id = ?1",
                                    params![id],
                                    |r| {
                                        Ok((
                                            r.get::<_, String>(0)?,
                                            r.get::<_, String>(1)?,
                                            r.get::<_, i64>(2)?,
                                            r.get::<_, String>(3)?,
                                            r.get::<_, String>(4)?,
                                            r.get::<_, String>(5)?,
                                            r.get::<_, i64>(6)?,
                                            r.get::<_, i64>(7)?,
                                        ))
                                    },
                                )
                                .ok()
                            {
                                let (id, text, dim, source, kind, metadata, created_at, updated_at) = conn_record;
                                out.push(SearchHit {
                                    record: Self::row_to_record(id, text, dim, source, kind, metadata, created_at, updated_at)?,
                                    score,
                                });
                            }
                        }
                        out
                    }
                }
            };

            if opts.filters.source.is_some() || opts.filters.kind.is_some() {
                hits.retain(|h| {
                    opts.filters.source.as_deref().map(|s| s == h.record.source).unwrap_or(true)
                        && opts.filters.kind.as_deref().map(|k| k == h.record.kind).unwrap_or(true)
                });
            }
            hits.retain(|h| h.score >= opts.min_score);
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(opts.limit);
            Ok(hits)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl SqliteMemoryStore {
    fn fetch_by_rowid(
        conn: &rusqlite::Connection,
        rowid: i64,
    ) -> Result<Option<MemoryRecord>, StoreError> {
        let row = conn
            .query_row(
                "SELECT id, text, dimension, source, kind, metadata, created_at, updated_at FROM memories WHERE rowid = ?1",
                params![rowid],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, i64>(6)?,
                        r.get::<_, i64>(7)?,
                    ))
                },
            )
            .ok();
        match row {
            Some((id, text, dim, source, kind, metadata, created_at, updated_at)) => Ok(Some(
                Self::row_to_record(id, text, dim, source, kind, metadata, created_at, updated_at)?,
            )),
            None => Ok(None),
        }
    }
}

pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
