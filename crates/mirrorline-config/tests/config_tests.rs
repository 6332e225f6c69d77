// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Mirrorline configuration system.

use mirrorline_config::diagnostic::ConfigError;
use mirrorline_config::model::MirrorlineConfig;
use mirrorline_config::{load_and_validate_str, load_config_from_str};
use mirrorline_core::DeliveryMode;

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_mirrorline_config() {
    let toml = r#"
[agent]
name = "relay-eu"
log_level = "debug"

[relay]
delivery_mode = "realtime"
default_batch_size = 5
max_buffer_items = 50
send_rate_per_sec = 3
durable_shadow = false
workers = 8

[storage]
database_path = "/tmp/mirror.db"
wal_mode = false

[telegram]
api_url = "http://localhost:8081"

[telegram.bot_tokens]
"7" = "7:secret"

[gateway]
port = 8088
bearer_token = "s3cret"

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "relay-eu");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.relay.delivery_mode, DeliveryMode::Realtime);
    assert_eq!(config.relay.default_batch_size, 5);
    assert_eq!(config.relay.max_buffer_items, 50);
    assert_eq!(config.relay.send_rate_per_sec, 3);
    assert!(!config.relay.durable_shadow);
    assert_eq!(config.relay.workers, 8);
    assert_eq!(config.storage.database_path, "/tmp/mirror.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.telegram.api_url.as_deref(), Some("http://localhost:8081"));
    assert_eq!(config.telegram.bot_tokens["7"], "7:secret");
    assert_eq!(config.gateway.port, 8088);
    assert_eq!(config.gateway.bearer_token.as_deref(), Some("s3cret"));
    assert!(!config.prometheus.enabled);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "mirrorline");
    assert_eq!(config.agent.log_level, "info");
    assert_eq!(config.relay.delivery_mode, DeliveryMode::Batch);
    assert_eq!(config.relay.default_batch_size, 10);
    assert_eq!(config.relay.default_batch_delay_secs, 120);
    assert_eq!(config.relay.default_flush_timeout_secs, 30);
    assert_eq!(config.relay.config_cache_ttl_secs, 600);
    assert!(config.relay.durable_shadow);
    assert!(config.storage.wal_mode);
    assert!(config.telegram.bot_tokens.is_empty());
    assert!(config.gateway.enabled);
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert!(config.gateway.bearer_token.is_none());
    assert!(config.prometheus.enabled);
}

/// Unknown field in [relay] is rejected by deny_unknown_fields.
#[test]
fn unknown_field_in_relay_produces_error() {
    let toml = r#"
[relay]
batch_sise = 3
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("batch_sise"),
        "error should mention the bad key, got: {err_str}"
    );
}

/// Unexpected top-level section is rejected.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[redis]
url = "redis://localhost"
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("redis"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Dotted overrides (what the env provider produces) reach nested keys intact.
#[test]
fn dotted_override_sets_underscored_key() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: MirrorlineConfig = Figment::new()
        .merge(Serialized::defaults(MirrorlineConfig::default()))
        .merge(Toml::string("[relay]\nsend_rate_per_sec = 5\n"))
        .merge(("relay.send_rate_per_sec", 9))
        .extract()
        .expect("should merge override");

    assert_eq!(config.relay.send_rate_per_sec, 9);
}

/// Missing config files are silently skipped.
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: MirrorlineConfig = Figment::new()
        .merge(Serialized::defaults(MirrorlineConfig::default()))
        .merge(Toml::file("/nonexistent/path/mirrorline.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.agent.name, "mirrorline");
}

/// Unknown key produces a diagnostic with a suggestion and the valid keys.
#[test]
fn diagnostic_error_includes_unknown_key_and_suggestion() {
    let toml = r#"
[relay]
workerz = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "workerz"
                && suggestion.as_deref() == Some("workers")
                && valid_keys.contains("max_attempts")
        })
    });
    assert!(found, "expected UnknownKey for 'workerz', got: {errors:?}");
}

/// A misspelled enum value is reported with the allowed values.
#[test]
fn diagnostic_unknown_delivery_mode() {
    let toml = r#"
[relay]
delivery_mode = "realtim"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown variant");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownVariant { value, allowed, .. } if {
            value == "realtim" && allowed.contains("batch")
        })
    });
    assert!(found, "expected UnknownVariant, got: {errors:?}");
}

/// Invalid type (string where number expected) produces clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[gateway]
port = "eighty"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("port"),
        "error should mention type mismatch, got: {err_str}"
    );
}

/// ConfigError can be rendered using miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "workerz".to_string(),
        suggestion: Some("workers".to_string()),
        valid_keys: "workers, max_attempts".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help text").to_string();
    assert!(help.contains("did you mean `workers`"), "got: {help}");

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("workerz"));
}

/// Validation errors surface through load_and_validate_str.
#[test]
fn validation_catches_zero_rate() {
    let toml = r#"
[relay]
send_rate_per_sec = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero rate should fail");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("send_rate_per_sec"))
    }));
}

/// load_and_validate_str with valid TOML returns Ok config.
#[test]
fn load_and_validate_valid_toml() {
    let config = load_and_validate_str("[agent]\nname = \"test\"\n")
        .expect("valid TOML should validate");
    assert_eq!(config.agent.name, "test");
}
