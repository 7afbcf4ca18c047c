//! Structural validation run on every load/reload.

use super::model::Config;
use super::ConfigError;

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.gateway.port == 0 {
        return Err(ConfigError::Validation("gateway.port must be nonzero".into()));
    }

    if !(0.0..=2.0).contains(&config.agents.defaults.temperature) {
        return Err(ConfigError::Validation(format!(
            "agents.defaults.temperature {} out of range 0.0..=2.0",
            config.agents.defaults.temperature
        )));
    }

    if !config.providers.iter().any(|p| p.api_key.as_deref().is_some_and(|k| !k.is_empty())) {
        return Err(ConfigError::Validation(
            "at least one provider must have a non-empty api_key".into(),
        ));
    }

    if config.tools.shell_enabled && config.tools.dangerous_command_denylist.is_empty() {
        return Err(ConfigError::Validation(
            "tools.dangerous_command_denylist must be non-empty when tools.shell_enabled is true".into(),
        ));
    }

    match config.session.reset.mode.as_str() {
        "idle" => {
            if config.session.reset.idle_minutes == 0 {
                return Err(ConfigError::Validation(
                    "session.reset.idle_minutes must be positive for mode \"idle\"".into(),
                ));
            }
        }
        "daily" => {
            if config.session.reset.daily_hour > 23 {
                return Err(ConfigError::Validation(
                    "session.reset.daily_hour must be within 0..=23 for mode \"daily\"".into(),
                ));
            }
        }
        other => {
            return Err(ConfigError::Validation(format!(
                "session.reset.mode {other:?} must be \"idle\" or \"daily\""
            )));
        }
    }

    if config.memory.enabled && config.memory.reindex_min_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "memory.reindex_min_interval_secs must be positive when memory.enabled is true".into(),
        ));
    }

    for (name, channel) in &config.channels {
        if !channel.enabled {
            continue;
        }
        if channel.account_id.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Validation(format!(
                "channels.{name}.account_id is required when the channel is enabled"
            )));
        }
        if name == "feishu" {
            validate_feishu_event_mode(channel)?;
        }
    }

    Ok(())
}

/// Feishu's event-mode field accepts loose casing/spelling in the source
/// config; normalized here to exactly `"challenge"` or `"event"`.
fn validate_feishu_event_mode(channel: &super::model::ChannelConfig) -> Result<(), ConfigError> {
    let Some(raw) = channel.extra.get("event_mode").and_then(|v| v.as_str()) else {
        return Err(ConfigError::Validation(
            "channels.feishu.event_mode is required when the channel is enabled".into(),
        ));
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "challenge" | "event" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "channels.feishu.event_mode {other:?} must normalize to \"challenge\" or \"event\""
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ChannelConfig, ProviderProfileConfig};

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.providers.push(ProviderProfileConfig {
            name: "openai".into(),
            api_key: Some("sk-test".into()),
            priority: 1,
            ..Default::default()
        });
        config
    }

    #[test]
    fn default_plus_one_provider_is_valid() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn rejects_zero_gateway_port() {
        let mut config = valid_config();
        config.gateway.port = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_temperature_out_of_range() {
        let mut config = valid_config();
        config.agents.defaults.temperature = 3.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_no_provider_api_key() {
        let config = Config::default();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_shell_enabled_without_denylist() {
        let mut config = valid_config();
        config.tools.shell_enabled = true;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn accepts_shell_enabled_with_denylist() {
        let mut config = valid_config();
        config.tools.shell_enabled = true;
        config.tools.dangerous_command_denylist = vec!["rm -rf /".into()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_unknown_reset_mode() {
        let mut config = valid_config();
        config.session.reset.mode = "weekly".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_enabled_channel_missing_account_id() {
        let mut config = valid_config();
        config.channels.insert("telegram".into(), ChannelConfig { enabled: true, ..Default::default() });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn normalizes_feishu_event_mode_case_insensitively() {
        let mut config = valid_config();
        let mut extra = serde_json::Map::new();
        extra.insert("event_mode".into(), serde_json::Value::String("CHALLENGE".into()));
        config.channels.insert(
            "feishu".into(),
            ChannelConfig { enabled: true, account_id: Some("acct".into()), extra },
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_unrecognized_feishu_event_mode() {
        let mut config = valid_config();
        let mut extra = serde_json::Map::new();
        extra.insert("event_mode".into(), serde_json::Value::String("carrier-pigeon".into()));
        config.channels.insert(
            "feishu".into(),
            ChannelConfig { enabled: true, account_id: Some("acct".into()), extra },
        );
        assert!(validate(&config).is_err());
    }
}
