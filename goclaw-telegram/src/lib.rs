//! Telegram channel adapter: a `teloxide` long-poll listener that publishes
//! admitted messages onto the runtime bus, plus the outbound send path with
//! typing-indicator bookkeeping.
//!
//! The adapter implements `goclaw_core::channels::ChannelAdapter`; the runtime
//! binary constructs it from the `channels.telegram` config section and
//! registers it with the channel registry so the outbound dispatcher can route
//! `(telegram, <account>)` messages here.

mod adapter;
mod convert;

pub use adapter::TelegramAdapter;
pub use convert::inbound_from_message;

use std::collections::HashMap;

use goclaw_core::channels::{resolve_credentials, AccountCredentials};
use goclaw_core::config::ChannelConfig;

/// Required credential keys for a Telegram account.
const REQUIRED: &[&str] = &["token"];

/// The resolved settings a `TelegramAdapter` is built from.
#[derive(Clone, Debug, PartialEq)]
pub struct TelegramSettings {
    pub token: String,
    pub account_id: String,
    pub allowlist: Vec<String>,
}

fn string_map_from_extra(extra: &serde_json::Map<String, serde_json::Value>) -> HashMap<String, String> {
    extra
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

/// Resolves the bot token and allowlist from a `channels.telegram` config
/// section. Top-level credentials win; otherwise the first enabled account
/// with a token, then the lexicographically first account with a token.
/// Returns `None` when the channel is disabled or no token resolves.
pub fn resolve_settings(config: &ChannelConfig) -> Option<TelegramSettings> {
    if !config.enabled {
        return None;
    }

    let top_level = string_map_from_extra(&config.extra);
    let accounts: Vec<(String, AccountCredentials)> = config
        .extra
        .get("accounts")
        .and_then(|v| v.as_object())
        .map(|accounts| {
            accounts
                .iter()
                .filter_map(|(name, value)| {
                    let obj = value.as_object()?;
                    Some((
                        name.clone(),
                        AccountCredentials {
                            enabled: obj.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false),
                            credentials: string_map_from_extra(obj),
                        },
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    let credentials = resolve_credentials(&top_level, REQUIRED, &accounts);
    let token = credentials.get("token").cloned()?;

    let allowlist = config
        .extra
        .get("allowlist")
        .and_then(|v| v.as_array())
        .map(|senders| {
            senders
                .iter()
                .filter_map(|s| match s {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(TelegramSettings {
        token,
        account_id: config.account_id.clone().unwrap_or_else(|| "default".to_string()),
        allowlist,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_config(json: serde_json::Value) -> ChannelConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn disabled_channel_resolves_to_none() {
        let config = channel_config(serde_json::json!({
            "enabled": false,
            "token": "123:abc",
        }));
        assert!(resolve_settings(&config).is_none());
    }

    #[test]
    fn top_level_token_wins_over_accounts() {
        let config = channel_config(serde_json::json!({
            "enabled": true,
            "token": "top:token",
            "accounts": { "alt": { "enabled": true, "token": "alt:token" } },
        }));
        let settings = resolve_settings(&config).unwrap();
        assert_eq!(settings.token, "top:token");
        assert_eq!(settings.account_id, "default");
    }

    #[test]
    fn first_enabled_account_is_used_when_no_top_level_token() {
        let config = channel_config(serde_json::json!({
            "enabled": true,
            "account_id": "bots",
            "accounts": {
                "disabled-bot": { "enabled": false, "token": "a:token" },
                "live-bot": { "enabled": true, "token": "b:token" },
            },
        }));
        let settings = resolve_settings(&config).unwrap();
        assert_eq!(settings.token, "b:token");
        assert_eq!(settings.account_id, "bots");
    }

    #[test]
    fn lexicographically_first_account_when_none_enabled() {
        let config = channel_config(serde_json::json!({
            "enabled": true,
            "accounts": {
                "zeta": { "enabled": false, "token": "z:token" },
                "alpha": { "enabled": false, "token": "a:token" },
            },
        }));
        let settings = resolve_settings(&config).unwrap();
        assert_eq!(settings.token, "a:token");
    }

    #[test]
    fn missing_token_everywhere_resolves_to_none() {
        let config = channel_config(serde_json::json!({
            "enabled": true,
            "accounts": { "a": { "enabled": true } },
        }));
        assert!(resolve_settings(&config).is_none());
    }

    #[test]
    fn allowlist_accepts_strings_and_numbers() {
        let config = channel_config(serde_json::json!({
            "enabled": true,
            "token": "t",
            "allowlist": ["123", 456],
        }));
        let settings = resolve_settings(&config).unwrap();
        assert_eq!(settings.allowlist, vec!["123".to_string(), "456".to_string()]);
    }
}
