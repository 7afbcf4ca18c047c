//! Bounded, persisted reload history with rollback.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::model::Config;
use super::ConfigError;

pub const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Auto,
    Manual,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigChange {
    pub timestamp_millis: i64,
    /// Flat map of changed leaf path (dot-joined) to `{old, new}`.
    pub diff: serde_json::Map<String, serde_json::Value>,
    pub old: Config,
    pub new: Config,
    pub success: bool,
    pub error: Option<String>,
    pub triggered_by: TriggerSource,
}

/// Deep-compares two configs by their JSON tree, emitting one diff entry per
/// leaf path that differs; structurally identical regardless of key iteration
/// order, so recording is deterministic for identical inputs.
pub fn diff(old: &Config, new: &Config) -> Result<serde_json::Map<String, serde_json::Value>, ConfigError> {
    let old_value = serde_json::to_value(old)?;
    let new_value = serde_json::to_value(new)?;
    let mut out = serde_json::Map::new();
    diff_into(&old_value, &new_value, &mut Vec::new(), &mut out);
    Ok(out)
}

fn diff_into(
    old: &serde_json::Value,
    new: &serde_json::Value,
    path: &mut Vec<String>,
    out: &mut serde_json::Map<String, serde_json::Value>,
) {
    use serde_json::Value;
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                path.push(key.clone());
                let old_value = old_map.get(key).unwrap_or(&Value::Null);
                let new_value = new_map.get(key).unwrap_or(&Value::Null);
                diff_into(old_value, new_value, path, out);
                path.pop();
            }
        }
        (old_value, new_value) => {
            if old_value != new_value {
                out.insert(
                    path.join("."),
                    serde_json::json!({"old": old_value, "new": new_value}),
                );
            }
        }
    }
}

pub struct ConfigHistory {
    path: PathBuf,
    max_entries: usize,
    entries: VecDeque<ConfigChange>,
}

impl ConfigHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), max_entries: DEFAULT_MAX_ENTRIES, entries: VecDeque::new() }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Loads a previously persisted history file; a missing file starts with
    /// an empty history rather than erroring.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.is_file() {
            return Ok(Self::new(path));
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("reading {}: {e}", path.display())))?;
        let entries: VecDeque<ConfigChange> = serde_json::from_str(&contents)?;
        Ok(Self { path, max_entries: DEFAULT_MAX_ENTRIES, entries })
    }

    pub fn entries(&self) -> &VecDeque<ConfigChange> {
        &self.entries
    }

    /// Appends `change`, evicting the oldest entry (FIFO) once over
    /// `max_entries`, then persists atomically (`.tmp` + rename, the same
    /// crash-safe idiom the session journal uses).
    pub fn record(&mut self, change: ConfigChange) -> Result<(), ConfigError> {
        self.entries.push_back(change);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(format!("creating {}: {e}", parent.display())))?;
        }
        let tmp_path = tmp_path_for(&self.path);
        let body = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(&tmp_path, body)
            .map_err(|e| ConfigError::Io(format!("writing {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| ConfigError::Io(format!("renaming {} to {}: {e}", tmp_path.display(), self.path.display())))?;
        Ok(())
    }

    /// Returns the old snapshot recorded at `index` (0 = oldest entry still
    /// retained).
    pub fn rollback(&self, index: usize) -> Option<Config> {
        self.entries.get(index).map(|change| change.old.clone())
    }

    /// Walks backward from the most recent entry to the most recent
    /// successful one.
    pub fn rollback_to_latest(&self) -> Option<Config> {
        self.entries.iter().rev().find(|change| change.success).map(|change| change.new.clone())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
