//! Config snapshot shape.
//!
//! `Config` is deliberately a plain `serde`-derived tree: the loader merges
//! defaults, environment, and file layers by round-tripping through
//! [`serde_json::Value`], so every field here must serialize losslessly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub agents: AgentsConfig,
    pub channels: HashMap<String, ChannelConfig>,
    pub providers: Vec<ProviderProfileConfig>,
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub tools: ToolsConfig,
    pub approvals: ApprovalsConfig,
    pub memory: MemoryConfig,
    pub skills: SkillsConfig,
    pub bindings: BindingsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: WorkspaceConfig::default(),
            agents: AgentsConfig::default(),
            channels: HashMap::new(),
            providers: Vec::new(),
            gateway: GatewayConfig::default(),
            session: SessionConfig::default(),
            tools: ToolsConfig::default(),
            approvals: ApprovalsConfig::default(),
            memory: MemoryConfig::default(),
            skills: SkillsConfig::default(),
            bindings: BindingsConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { root: "~/.goclaw/workspace".to_string() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentDefaults {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self { model: "gpt-4o-mini".to_string(), temperature: 0.7, system_prompt: None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub account_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProviderProfileConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub priority: u32,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8787, token: None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SessionConfig {
    pub reset: SessionResetConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionResetConfig {
    /// `"idle"` or `"daily"`.
    pub mode: String,
    pub idle_minutes: u64,
    /// Hour-of-day (0-23, local time) for `daily` mode.
    pub daily_hour: u32,
}

impl Default for SessionResetConfig {
    fn default() -> Self {
        Self { mode: "idle".to_string(), idle_minutes: 60, daily_hour: 4 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ToolsConfig {
    pub shell_enabled: bool,
    pub dangerous_command_denylist: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ApprovalsConfig {
    pub require_for: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub embedder: Option<String>,
    pub dimension: usize,
    pub reindex_min_interval_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { enabled: true, embedder: None, dimension: 1536, reindex_min_interval_secs: 300 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SkillsConfig {
    pub enabled: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BindingsConfig {
    pub entries: HashMap<String, String>,
}
