//! Runtime wiring for `gateway run`: builds every subsystem from the config
//! snapshot, starts the background tasks, and runs the gateway until ctrl-c.

mod cli_adapter;
mod turn;

pub use cli_adapter::CliAdapter;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use goclaw_core::channels::OutboundDispatcher;
use goclaw_core::config::{default_config_path, default_data_root, default_history_path};
use goclaw_core::memory::{Embedder, OpenAIEmbedder};
use goclaw_core::provider::{ConcurrencyLimitedProvider, RetryingProvider, RotationConfig};
use goclaw_core::session::ResetPolicy;
use goclaw_core::{
    ChannelAdapter, ChannelRegistry, ChatProvider, Config, ConfigLoader, ConfigRuntime, LaneScheduler, MemoryManager,
    MessageBus, OpenAIChatProvider, ProviderRotation, SessionManager, SqliteMemoryStore,
};
use goclaw_gateway::GatewayDeps;
use goclaw_telegram::TelegramAdapter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// In-flight LLM calls across the whole process; streaming turns hold a slot
/// for their full duration.
const MAX_CONCURRENT_LLM_CALLS: usize = 4;
const SHUTDOWN_QUIESCENCE: Duration = Duration::from_secs(5);

/// Expands a leading `~/` against the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

pub fn reset_policy_from(config: &Config) -> ResetPolicy {
    let reset = &config.session.reset;
    match reset.mode.as_str() {
        "daily" => ResetPolicy::DailyAt(reset.daily_hour),
        _ => ResetPolicy::Idle(reset.idle_minutes as i64),
    }
}

/// Builds the provider stack the turn runner calls through: a rotation over
/// every configured profile, wrapped in the concurrency limit, wrapped in
/// classified exponential-backoff retry.
async fn build_provider_stack(config: &Config) -> Option<Arc<dyn ChatProvider>> {
    let rotation = ProviderRotation::new(RotationConfig::default());
    let default_model = config.agents.defaults.model.clone();
    let mut registered = 0usize;
    for profile in &config.providers {
        let Some(api_key) = profile.api_key.clone().filter(|k| !k.is_empty()) else {
            continue;
        };
        let mut openai_config = async_openai_config(api_key);
        if let Some(base) = &profile.base_url {
            openai_config = openai_config.with_api_base(base.clone());
        }
        let model = profile.model.clone().unwrap_or_else(|| default_model.clone());
        let provider = OpenAIChatProvider::with_config(openai_config, model)
            .with_temperature(config.agents.defaults.temperature);
        rotation.add_profile(profile.name.clone(), Arc::new(provider), profile.priority as i32).await;
        registered += 1;
    }
    if registered == 0 {
        return None;
    }
    let limited = ConcurrencyLimitedProvider::new(rotation, MAX_CONCURRENT_LLM_CALLS);
    let retrying = RetryingProvider::new(limited, Default::default());
    Some(Arc::new(retrying))
}

fn async_openai_config(api_key: String) -> goclaw_core::provider::OpenAIConfig {
    goclaw_core::provider::OpenAIConfig::new().with_api_key(api_key)
}

pub struct Runtime {
    pub config: Arc<ConfigRuntime>,
    pub sessions: Arc<SessionManager>,
    pub channels: Arc<ChannelRegistry>,
    pub memory: Arc<MemoryManager>,
    pub lanes: Arc<LaneScheduler>,
    pub bus: Arc<MessageBus>,
    cancel: CancellationToken,
}

impl Runtime {
    /// Wires every subsystem and starts the background tasks (channel
    /// listeners, outbound dispatcher, turn runner, memory watchers, config
    /// watcher).
    pub async fn build(config_path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let loader = match &config_path {
            Some(path) => ConfigLoader::with_path(path),
            None => ConfigLoader::new(),
        };
        let config_runtime = Arc::new(ConfigRuntime::new(loader, default_history_path()).await?);
        let config = config_runtime.get().await;

        let data_root = default_data_root();
        let cancel = CancellationToken::new();

        let sessions = Arc::new(SessionManager::new(data_root.join("sessions")));
        sessions.set_reset_policy(Some(reset_policy_from(&config))).await;

        let lanes = Arc::new(LaneScheduler::new());
        let bus = Arc::new(MessageBus::default());
        let channels = Arc::new(ChannelRegistry::new());

        // Channel adapters from config.
        if let Some(telegram_config) = config.channels.get("telegram") {
            match goclaw_telegram::resolve_settings(telegram_config) {
                Some(settings) => {
                    let adapter = Arc::new(TelegramAdapter::new(settings, bus.clone()));
                    adapter.start(cancel.clone()).await?;
                    channels.register(adapter);
                    info!("telegram adapter started");
                }
                None => warn!("channels.telegram is present but disabled or missing a token"),
            }
        }
        if config.channels.get("cli").map(|c| c.enabled).unwrap_or(false) {
            let adapter = Arc::new(CliAdapter::new(bus.clone()));
            adapter.start(cancel.clone()).await?;
            channels.register(adapter);
            info!("cli adapter started (reading stdin)");
        }

        // Memory engine; the store lives under the data root, the watcher
        // follows the configured workspace.
        let store_path = data_root.join("memory").join("store.db");
        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Arc::new(SqliteMemoryStore::new(&store_path, config.memory.dimension)?);
        let embedder: Option<Arc<dyn Embedder>> = match config.memory.embedder.as_deref() {
            Some("openai") => Some(Arc::new(OpenAIEmbedder::new("text-embedding-3-small"))),
            Some(other) => {
                warn!(embedder = other, "unknown embedder, falling back to full-text search");
                None
            }
            None => None,
        };
        let memory = Arc::new(
            MemoryManager::new(store, embedder)
                .with_min_reindex_interval(Duration::from_secs(config.memory.reindex_min_interval_secs)),
        );
        if config.memory.enabled {
            let workspace_memory = expand_tilde(&config.workspace.root).join("memory");
            std::fs::create_dir_all(&workspace_memory)?;
            memory.spawn_watchers(workspace_memory, data_root.join("sessions"), cancel.clone());
        }

        // Outbound delivery and the turn runner.
        {
            let dispatcher = OutboundDispatcher::new(bus.clone(), channels.clone());
            let dispatcher_cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(dispatcher_cancel).await });
        }
        match build_provider_stack(&config).await {
            Some(provider) => {
                let _ = turn::spawn_turn_runner(
                    turn::TurnDeps {
                        bus: bus.clone(),
                        sessions: sessions.clone(),
                        lanes: lanes.clone(),
                        provider,
                        agent_id: "main".to_string(),
                    },
                    cancel.clone(),
                );
            }
            None => warn!("no provider profile carries an api key; inbound messages will not be answered"),
        }

        // Config hot-reload: watch the file, and re-derive the session reset
        // policy whenever a reload lands.
        {
            let handler_sessions = sessions.clone();
            config_runtime
                .register_handler(Box::new(move |_old, new| {
                    let sessions = handler_sessions.clone();
                    let policy = reset_policy_from(new);
                    tokio::spawn(async move { sessions.set_reset_policy(Some(policy)).await });
                    Ok(())
                }))
                .await;
            let watch_path = config_path.clone().unwrap_or_else(default_config_path);
            let _ = config_runtime.spawn_watcher(watch_path, cancel.clone());
        }

        Ok(Self {
            config: config_runtime,
            sessions,
            channels,
            memory,
            lanes,
            bus,
            cancel,
        })
    }

    /// Runs the gateway until ctrl-c, then drains the lanes and stops the
    /// background tasks.
    pub async fn run(self, addr_override: Option<String>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let config = self.config.get().await;
        let addr = addr_override.unwrap_or_else(|| format!("{}:{}", config.gateway.host, config.gateway.port));
        let deps = GatewayDeps {
            sessions: self.sessions,
            channels: self.channels,
            config: self.config,
            memory: self.memory,
            lanes: self.lanes.clone(),
            bus: self.bus,
            token: config.gateway.token.clone(),
        };

        let gateway = tokio::spawn(async move { goclaw_gateway::run_gateway(Some(&addr), deps).await });
        tokio::select! {
            result = gateway => {
                self.cancel.cancel();
                result??;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                self.cancel.cancel();
                if !self.lanes.wait_quiescence(SHUTDOWN_QUIESCENCE).await {
                    warn!("tasks still active after quiescence deadline, exiting anyway");
                }
            }
        }
        Ok(())
    }
}
