//! Configuration Hot-Reload & History: a layered loader, a
//! debounced file watcher, and a bounded, persisted reload history with
//! rollback.
//!
//! [`ConfigRuntime`] is the facade: it owns the current [`Config`] snapshot,
//! the [`ConfigHistory`], and the registered [`ChangeHandler`]s, and is the
//! only thing callers interact with.

mod history;
mod loader;
mod model;
mod validate;
mod watcher;

pub use history::{ConfigChange, ConfigHistory, TriggerSource, DEFAULT_MAX_ENTRIES};
pub use loader::ConfigLoader;
pub use model::{
    AgentDefaults, AgentsConfig, ApprovalsConfig, BindingsConfig, ChannelConfig, Config, GatewayConfig,
    MemoryConfig, ProviderProfileConfig, SessionConfig, SessionResetConfig, SkillsConfig, ToolsConfig,
    WorkspaceConfig,
};
pub use watcher::{spawn_config_watcher, DEBOUNCE as WATCHER_DEBOUNCE};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation error: {0}")]
    Validation(String),
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A registered callback run against `(old, new)` on every reload; may
/// re-derive downstream state. An error is logged and recorded but does not
/// stop the remaining handlers.
pub type ChangeHandler = Box<dyn Fn(&Config, &Config) -> Result<(), ConfigError> + Send + Sync>;

/// Ties the loader, the live snapshot, the registered handlers, and the
/// history together.
pub struct ConfigRuntime {
    loader: ConfigLoader,
    current: RwLock<Config>,
    history: tokio::sync::Mutex<ConfigHistory>,
    handlers: tokio::sync::Mutex<Vec<ChangeHandler>>,
}

impl ConfigRuntime {
    /// Loads the initial snapshot via `loader` and opens (or creates) the
    /// history file at `history_path`.
    pub async fn new(loader: ConfigLoader, history_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let initial = loader.load()?;
        let history = ConfigHistory::load(history_path)?;
        Ok(Self {
            loader,
            current: RwLock::new(initial),
            history: tokio::sync::Mutex::new(history),
            handlers: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    pub async fn get(&self) -> Config {
        self.current.read().await.clone()
    }

    pub async fn register_handler(&self, handler: ChangeHandler) {
        self.handlers.lock().await.push(handler);
    }

    /// Re-loads via the loader, runs every registered handler against
    /// `(old, new)` in order (an error from one does not stop the rest),
    /// records the attempt in history, and swaps in the new snapshot only on
    /// a successful load.
    pub async fn reload(&self, trigger: TriggerSource) -> Result<(), ConfigError> {
        let old = self.get().await;
        let load_result = self.loader.load();

        let (new, success, error) = match load_result {
            Ok(new) => {
                let mut handler_errors = Vec::new();
                for handler in self.handlers.lock().await.iter() {
                    if let Err(e) = handler(&old, &new) {
                        tracing::warn!(error = %e, "config change handler failed");
                        handler_errors.push(e.to_string());
                    }
                }
                let error = (!handler_errors.is_empty()).then(|| handler_errors.join("; "));
                (new, true, error)
            }
            Err(e) => (old.clone(), false, Some(e.to_string())),
        };

        if success {
            *self.current.write().await = new.clone();
        }

        let diff = history::diff(&old, &new)?;
        self.history
            .lock()
            .await
            .record(ConfigChange {
                timestamp_millis: chrono::Utc::now().timestamp_millis(),
                diff,
                old,
                new,
                success,
                error: error.clone(),
                triggered_by: trigger,
            })?;

        match error {
            Some(e) if !success => Err(ConfigError::Validation(e)),
            _ => Ok(()),
        }
    }

    pub async fn history_entries(&self) -> Vec<ConfigChange> {
        self.history.lock().await.entries().iter().cloned().collect()
    }

    /// Returns the old snapshot recorded at `index` without applying it;
    /// callers decide whether/how to re-apply (e.g. writing it back out and
    /// triggering a manual reload).
    pub async fn rollback(&self, index: usize) -> Option<Config> {
        self.history.lock().await.rollback(index)
    }

    pub async fn rollback_to_latest(&self) -> Option<Config> {
        self.history.lock().await.rollback_to_latest()
    }

    /// Starts the config file watcher task; `config_path` is the file the
    /// loader was constructed to read (or discover).
    pub fn spawn_watcher(
        self: &Arc<Self>,
        config_path: PathBuf,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        spawn_config_watcher(self.clone(), config_path, cancel)
    }
}

/// Default data root `~/.goclaw/`.
pub fn default_data_root() -> PathBuf {
    loader::default_data_root()
}

pub fn default_config_path() -> PathBuf {
    default_data_root().join("config.json")
}

pub fn default_history_path() -> PathBuf {
    default_data_root().join("config_history.json")
}
