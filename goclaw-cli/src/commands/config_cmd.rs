//! `goclaw config show`.

use std::path::PathBuf;

use super::{load_config, CommandError};

/// Blanks secret-bearing fields before the snapshot is printed.
fn redact(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(token) = value.pointer_mut("/gateway/token") {
        if !token.is_null() {
            *token = serde_json::json!("***redacted***");
        }
    }
    if let Some(providers) = value.get_mut("providers").and_then(|v| v.as_array_mut()) {
        for provider in providers {
            if let Some(key) = provider.get_mut("api_key") {
                if !key.is_null() {
                    *key = serde_json::json!("***redacted***");
                }
            }
        }
    }
    if let Some(channels) = value.get_mut("channels").and_then(|v| v.as_object_mut()) {
        for channel in channels.values_mut() {
            if let Some(token) = channel.get_mut("token") {
                *token = serde_json::json!("***redacted***");
            }
            if let Some(accounts) = channel.get_mut("accounts").and_then(|v| v.as_object_mut()) {
                for account in accounts.values_mut() {
                    if let Some(token) = account.get_mut("token") {
                        *token = serde_json::json!("***redacted***");
                    }
                }
            }
        }
    }
    value
}

pub async fn show(config_path: Option<PathBuf>) -> Result<(), CommandError> {
    let config = load_config(config_path)?;
    let value = redact(serde_json::to_value(&config)?);
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_blanks_provider_keys_and_channel_tokens() {
        let value = serde_json::json!({
            "gateway": { "token": "secret" },
            "providers": [{ "name": "openai", "api_key": "sk-live" }],
            "channels": {
                "telegram": {
                    "enabled": true,
                    "token": "123:abc",
                    "accounts": { "alt": { "token": "456:def" } },
                },
            },
        });
        let redacted = redact(value);
        assert_eq!(redacted["gateway"]["token"], "***redacted***");
        assert_eq!(redacted["providers"][0]["api_key"], "***redacted***");
        assert_eq!(redacted["channels"]["telegram"]["token"], "***redacted***");
        assert_eq!(redacted["channels"]["telegram"]["accounts"]["alt"]["token"], "***redacted***");
    }

    #[test]
    fn redact_leaves_absent_secrets_null() {
        let value = serde_json::json!({ "gateway": { "token": null }, "providers": [] });
        let redacted = redact(value);
        assert!(redacted["gateway"]["token"].is_null());
    }
}
