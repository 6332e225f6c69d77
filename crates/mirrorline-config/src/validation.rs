// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive batch sizes, parseable bot IDs, and non-empty paths.

use crate::diagnostic::ConfigError;
use crate::model::MirrorlineConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MirrorlineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let relay = &config.relay;

    let mut positive = |name: &str, value: u64| {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("relay.{name} must be greater than zero"),
            });
        }
    };
    positive("default_batch_size", u64::from(relay.default_batch_size));
    positive("max_buffer_items", relay.max_buffer_items as u64);
    positive("send_rate_per_sec", u64::from(relay.send_rate_per_sec));
    positive("transport_timeout_secs", relay.transport_timeout_secs);
    positive("workers", relay.workers as u64);
    positive("max_attempts", u64::from(relay.max_attempts));
    positive("poll_interval_ms", relay.poll_interval_ms);
    positive("sweep_interval_secs", relay.sweep_interval_secs);
    positive("thread_lock_ttl_secs", relay.thread_lock_ttl_secs);

    if relay.max_buffer_items < relay.default_batch_size as usize {
        errors.push(ConfigError::Validation {
            message: format!(
                "relay.max_buffer_items ({}) must not be smaller than relay.default_batch_size ({})",
                relay.max_buffer_items, relay.default_batch_size
            ),
        });
    }

    if relay.retry_max_ms < relay.retry_base_ms {
        errors.push(ConfigError::Validation {
            message: "relay.retry_max_ms must be at least relay.retry_base_ms".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    for (bot, token) in &config.telegram.bot_tokens {
        if bot.parse::<i64>().is_err() {
            errors.push(ConfigError::Validation {
                message: format!("telegram.bot_tokens key `{bot}` is not a numeric bot ID"),
            });
        }
        if token.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("telegram.bot_tokens.{bot} must not be empty"),
            });
        }
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("gateway.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if let Some(token) = &config.gateway.bearer_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "gateway.bearer_token must not be empty when set".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = MirrorlineConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = MirrorlineConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "database_path"));
    }

    #[test]
    fn zero_batch_size_and_workers_are_both_reported() {
        let mut config = MirrorlineConfig::default();
        config.relay.default_batch_size = 0;
        config.relay.workers = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "default_batch_size"));
        assert!(has_message(&errors, "workers"));
    }

    #[test]
    fn buffer_cap_below_batch_size_fails() {
        let mut config = MirrorlineConfig::default();
        config.relay.default_batch_size = 50;
        config.relay.max_buffer_items = 20;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "max_buffer_items"));
    }

    #[test]
    fn non_numeric_bot_token_key_fails() {
        let mut config = MirrorlineConfig::default();
        config
            .telegram
            .bot_tokens
            .insert("support-bot".to_string(), "1:abc".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "support-bot"));
    }

    #[test]
    fn invalid_gateway_host_fails() {
        let mut config = MirrorlineConfig::default();
        config.gateway.host = "not a host!".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "gateway.host"));
    }
}
