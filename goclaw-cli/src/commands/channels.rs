//! `goclaw channels ...` subcommands.

use std::path::PathBuf;

use super::{load_config, CommandError};

/// `channels list`: configured channel names and enablement.
pub async fn list(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    if config.channels.is_empty() {
        println!("no channels configured");
        return Ok(());
    }
    let mut names: Vec<_> = config.channels.keys().collect();
    names.sort();
    for name in names {
        let channel = &config.channels[name];
        let state = if channel.enabled { "enabled" } else { "disabled" };
        println!("{name}: {state}");
    }
    Ok(())
}

/// `channels status`: enablement plus whether credentials resolve.
pub async fn status(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    if config.channels.is_empty() {
        println!("no channels configured");
        return Ok(());
    }
    let mut names: Vec<_> = config.channels.keys().collect();
    names.sort();
    for name in names {
        let channel = &config.channels[name];
        let credentials = match name.as_str() {
            "telegram" => match goclaw_telegram::resolve_settings(channel) {
                Some(settings) => format!("credentials ok (account {})", settings.account_id),
                None if channel.enabled => "missing credentials".to_string(),
                None => "-".to_string(),
            },
            // The cli/ws loopback channels carry no credentials.
            "cli" | "ws" => "-".to_string(),
            _ => "unknown channel type".to_string(),
        };
        let state = if channel.enabled { "enabled" } else { "disabled" };
        println!("{name}: {state}, {credentials}");
    }
    Ok(())
}
