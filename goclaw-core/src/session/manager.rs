//! Session manager facade.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use super::freshness::ResetPolicy;
use super::journal::{self, JournalError};
use super::Session;

/// `sanitized filename -> original key` sidecar, consulted before the lossy
/// heuristic decode.
#[derive(Default, serde::Serialize, serde::Deserialize)]
struct Index(HashMap<String, String>);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the in-memory session index and the on-disk journal directory.
pub struct SessionManager {
    dir: PathBuf,
    reset_policy: RwLock<Option<ResetPolicy>>,
    index: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            reset_policy: RwLock::new(None),
            index: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_reset_policy(&self, policy: Option<ResetPolicy>) {
        *self.reset_policy.write().await = policy;
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    async fn load_filename_index(&self) -> Index {
        match tokio::fs::read_to_string(self.index_path()).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Index::default(),
        }
    }

    async fn save_filename_index(&self, index: &Index) -> Result<(), SessionError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let contents = serde_json::to_string_pretty(index).unwrap_or_default();
        tokio::fs::write(self.index_path(), contents).await?;
        Ok(())
    }

    async fn record_filename(&self, filename: &str, key: &str) -> Result<(), SessionError> {
        let mut index = self.load_filename_index().await;
        if index.0.get(filename).map(String::as_str) != Some(key) {
            index.0.insert(filename.to_string(), key.to_string());
            self.save_filename_index(&index).await?;
        }
        Ok(())
    }

    /// Returns the session for `key`, creating an empty one if absent, applying the
    /// freshness policy in place, and caching the result in the in-memory index.
    pub async fn get_or_create(&self, key: &str) -> Result<Arc<Mutex<Session>>, SessionError> {
        if let Some(existing) = self.index.read().await.get(key) {
            self.apply_freshness(existing).await;
            return Ok(existing.clone());
        }

        let filename = journal::sanitize_filename(key);
        let path = self.dir.join(&filename);
        let session = if path.exists() {
            journal::load(&path, key)?
        } else {
            Session::new(key)
        };
        self.record_filename(&filename, key).await?;

        let handle = Arc::new(Mutex::new(session));
        self.apply_freshness(&handle).await;
        self.index.write().await.insert(key.to_string(), handle.clone());
        Ok(handle)
    }

    async fn apply_freshness(&self, handle: &Arc<Mutex<Session>>) {
        if let Some(policy) = *self.reset_policy.read().await {
            let mut session = handle.lock().await;
            policy.apply(&mut session, Utc::now());
        }
    }

    /// Persists `session` to its journal file, recording the index entry.
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let filename = journal::sanitize_filename(&session.key);
        let dir = self.dir.clone();
        let filename_owned = filename.clone();
        let session_clone = session.clone();
        tokio::task::spawn_blocking(move || journal::save(&dir, &filename_owned, &session_clone))
            .await
            .expect("journal save task panicked")?;
        self.record_filename(&filename, &session.key).await?;
        Ok(())
    }

    /// Removes `key` from both the in-memory index and disk, if present.
    pub async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.index.write().await.remove(key);
        let filename = journal::sanitize_filename(key);
        let path = self.dir.join(&filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists all known session keys, performing `.tmp` promotion recovery first
    ///, resolving filenames via the `index.json`
    /// sidecar and falling back to the best-effort heuristic.
    pub async fn list(&self) -> Result<Vec<String>, SessionError> {
        let dir = self.dir.clone();
        let filenames =
            tokio::task::spawn_blocking(move || journal::list_recovering(&dir)).await.expect("list task panicked")?;
        let index = self.load_filename_index().await;

        let mut keys: Vec<String> = filenames
            .into_iter()
            .map(|filename| {
                index
                    .0
                    .get(&filename)
                    .cloned()
                    .unwrap_or_else(|| journal::best_effort_key_from_filename(&filename))
            })
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Message, SessionScope};
    use tempfile::tempdir;

    #[tokio::test]
    async fn get_or_create_creates_then_returns_the_same_handle() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        let a = manager.get_or_create("agent:a1:main").await.unwrap();
        let b = manager.get_or_create("agent:a1:main").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn save_then_fresh_manager_loads_it_back() {
        let dir = tempdir().unwrap();
        let key = super::super::session_key("a1", &SessionScope::Direct, None);
        {
            let manager = SessionManager::new(dir.path());
            let handle = manager.get_or_create(&key).await.unwrap();
            {
                let mut session = handle.lock().await;
                session.add_message(Message::user("hi"));
            }
            let session = handle.lock().await;
            manager.save(&session).await.unwrap();
        }

        let manager2 = SessionManager::new(dir.path());
        let handle = manager2.get_or_create(&key).await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.key, key);
    }

    #[tokio::test]
    async fn list_returns_saved_keys_via_index_sidecar() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        let key = "agent:a1:telegram:group:42";
        let handle = manager.get_or_create(key).await.unwrap();
        let session = handle.lock().await;
        manager.save(&session).await.unwrap();
        drop(session);

        let keys = manager.list().await.unwrap();
        assert_eq!(keys, vec![key.to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_from_index_and_disk() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        let key = "agent:a1:main";
        let handle = manager.get_or_create(key).await.unwrap();
        let session = handle.lock().await;
        manager.save(&session).await.unwrap();
        drop(session);

        manager.delete(key).await.unwrap();
        let keys = manager.list().await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn get_or_create_applies_freshness_policy_on_stale_session() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        manager.set_reset_policy(Some(ResetPolicy::Idle(30))).await;

        let key = "agent:a1:main";
        let handle = manager.get_or_create(key).await.unwrap();
        {
            let mut session = handle.lock().await;
            session.add_message(Message::user("hi"));
            session.updated_at = Utc::now() - chrono::Duration::minutes(60);
        }
        let session = handle.lock().await;
        manager.save(&session).await.unwrap();
        drop(session);
        manager.index.write().await.clear();

        let handle2 = manager.get_or_create(key).await.unwrap();
        let session2 = handle2.lock().await;
        assert!(session2.messages.is_empty());
    }
}
