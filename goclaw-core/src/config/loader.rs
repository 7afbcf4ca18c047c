//! Layered config loader: defaults → environment → file,
//! producing one snapshot atomically. A missing file at every candidate
//! location is not an error.

use std::path::PathBuf;

use serde_json::Value;

use super::model::Config;
use super::validate::validate;
use super::ConfigError;

const ENV_PREFIX: &str = "GOSKILLS_";

pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { explicit_path: None }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { explicit_path: Some(path.into()) }
    }

    /// Runs the full defaults → env → file merge, validates the result, and
    /// returns the snapshot. The file layer is skipped entirely (not an
    /// error) when no candidate path exists.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut value = serde_json::to_value(Config::default())?;

        if let Some(path) = self.resolve_file_path() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Io(format!("reading {}: {e}", path.display())))?;
            let file_value: Value = serde_json::from_str(&contents)
                .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
            merge(&mut value, file_value);
        }

        apply_env_overrides(&mut value, Vec::new());

        let config: Config = serde_json::from_value(value)?;
        validate(&config)?;
        Ok(config)
    }

    /// Explicit path if given, else `~/.goclaw/config.json`, else
    /// `./config.json`; first one that exists on disk wins.
    fn resolve_file_path(&self) -> Option<PathBuf> {
        let candidates = [
            self.explicit_path.clone(),
            dirs::home_dir().map(|h| h.join(".goclaw").join("config.json")),
            Some(PathBuf::from("./config.json")),
        ];
        candidates.into_iter().flatten().find(|p| p.is_file())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-merges `overlay` onto `base`: object keys merge recursively; any
/// other value (including arrays) replaces the base value wholesale.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Walks the merged value's own shape to build `GOSKILLS_<PATH>` candidate
/// env var names, dot-path segments joined with `_` and upper-cased, then
/// overwrites any leaf whose env var is set. Walking the value's actual shape,
/// rather than blindly splitting the env var name on `_`, sidesteps the
/// ambiguity of field names that themselves contain underscores
/// (e.g. `idle_minutes`).
fn apply_env_overrides(value: &mut Value, path: Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let mut child_path = path.clone();
                child_path.push(key.clone());
                apply_env_overrides(child, child_path);
            }
        }
        leaf => {
            let env_key = format!("{ENV_PREFIX}{}", path.join("_").to_ascii_uppercase());
            if let Ok(raw) = std::env::var(&env_key) {
                *leaf = coerce_like(leaf, &raw);
            }
        }
    }
}

/// Parses `raw` as JSON when it structurally matches the existing leaf's
/// type (numbers, bools); otherwise keeps it as a plain string. Lets
/// `GOSKILLS_GATEWAY_PORT=9000` land as a number without requiring the
/// operator to write `GOSKILLS_GATEWAY_PORT='"9000"'`-style quoting.
fn coerce_like(existing: &Value, raw: &str) -> Value {
    match existing {
        Value::Number(_) => serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
        Value::Bool(_) => match raw.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => {
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        _ => Value::String(raw.to_string()),
    }
}

pub(crate) fn default_data_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".goclaw")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env::set_var` mutates process-global state; serialize these tests
    // so they don't stomp each other's env vars.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_with_no_file_returns_defaults_with_one_provider_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GOSKILLS_PROVIDERS", r#"[{"name":"openai","api_key":"sk-test","priority":1}]"#);
        let loader = ConfigLoader::with_path("/nonexistent/path/config.json");
        let config = loader.load().unwrap();
        std::env::remove_var("GOSKILLS_PROVIDERS");
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "openai");
    }

    #[test]
    fn file_layer_overrides_defaults_and_env_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "agents": {"defaults": {"model": "from-file", "temperature": 0.5}},
                "providers": [{"name": "openai", "api_key": "sk-file", "priority": 1}],
            })
            .to_string(),
        )
        .unwrap();

        std::env::set_var("GOSKILLS_AGENTS_DEFAULTS_MODEL", "from-env");
        let loader = ConfigLoader::with_path(&path);
        let config = loader.load().unwrap();
        std::env::remove_var("GOSKILLS_AGENTS_DEFAULTS_MODEL");

        assert_eq!(config.agents.defaults.model, "from-env");
        assert_eq!(config.agents.defaults.temperature, 0.5);
    }

    #[test]
    fn missing_file_at_every_candidate_is_not_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GOSKILLS_PROVIDERS", r#"[{"name":"openai","api_key":"sk-test","priority":1}]"#);
        let loader = ConfigLoader::with_path("/definitely/does/not/exist.json");
        let result = loader.load();
        std::env::remove_var("GOSKILLS_PROVIDERS");
        assert!(result.is_ok());
    }

    #[test]
    fn env_override_coerces_numeric_fields() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GOSKILLS_PROVIDERS", r#"[{"name":"openai","api_key":"sk-test","priority":1}]"#);
        std::env::set_var("GOSKILLS_GATEWAY_PORT", "9100");
        let loader = ConfigLoader::with_path("/nonexistent/path/config.json");
        let config = loader.load().unwrap();
        std::env::remove_var("GOSKILLS_GATEWAY_PORT");
        std::env::remove_var("GOSKILLS_PROVIDERS");
        assert_eq!(config.gateway.port, 9100);
    }

    #[test]
    fn merge_replaces_arrays_wholesale_rather_than_concatenating() {
        let mut base = serde_json::json!({"skills": {"enabled": ["a", "b"]}});
        merge(&mut base, serde_json::json!({"skills": {"enabled": ["c"]}}));
        assert_eq!(base["skills"]["enabled"], serde_json::json!(["c"]));
    }
}
