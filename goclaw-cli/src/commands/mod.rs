//! Subcommand implementations. Each is a thin translation from CLI arguments
//! to `goclaw-core` / `goclaw-gateway` calls; exit-code mapping lives in main.

pub mod channels;
pub mod config_cmd;
pub mod gateway;
pub mod memory;

use std::path::PathBuf;

use goclaw_core::{Config, ConfigLoader};

pub type CommandError = Box<dyn std::error::Error + Send + Sync>;

/// Loads the effective config snapshot the same way the runtime would.
pub fn load_config(config_path: Option<PathBuf>) -> Result<Config, CommandError> {
    let loader = match config_path {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    Ok(loader.load()?)
}

pub fn onboard() {
    println!("goclaw onboarding");
    println!();
    println!("1. Create {} with at least one provider:", goclaw_core::config::default_config_path().display());
    println!("   {{ \"providers\": [{{ \"name\": \"openai\", \"api_key\": \"sk-...\", \"priority\": 1 }}] }}");
    println!("2. Optionally add a channel, e.g. channels.telegram with enabled=true and a bot token.");
    println!("3. Check the result with `goclaw config show`.");
    println!("4. Start the runtime with `goclaw gateway run`.");
}

pub fn configure() {
    println!("Interactive configuration is not built in; edit the config file directly:");
    println!("  {}", goclaw_core::config::default_config_path().display());
    println!("Environment overrides use the GOSKILLS_ prefix with the dot path underscored,");
    println!("e.g. GOSKILLS_GATEWAY_PORT=9000 or GOSKILLS_AGENTS_DEFAULTS_MODEL=gpt-4o.");
    println!("Validate with `goclaw config show` and reload a running gateway by saving the file.");
}
