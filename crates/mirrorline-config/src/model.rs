// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mirrorline relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use mirrorline_core::DeliveryMode;
use serde::{Deserialize, Serialize};

/// Top-level Mirrorline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorlineConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Relay pipeline tunables.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Durable store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telegram transport settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// HTTP ingest gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Instance name, used in logs and health output.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "mirrorline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Relay pipeline configuration.
///
/// The `default_*` batch parameters seed `mirrorline configure` when a bot's
/// configuration does not set its own.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// `realtime` flushes every message at once; `batch` accumulates.
    #[serde(default)]
    pub delivery_mode: DeliveryMode,

    #[serde(default = "default_batch_size")]
    pub default_batch_size: u32,

    #[serde(default = "default_batch_delay_secs")]
    pub default_batch_delay_secs: u64,

    #[serde(default = "default_flush_timeout_secs")]
    pub default_flush_timeout_secs: u64,

    /// Buffer length that forces a flush regardless of batch size.
    #[serde(default = "default_max_buffer_items")]
    pub max_buffer_items: usize,

    /// Per-bot ceiling of deliveries per one-second window.
    #[serde(default = "default_send_rate_per_sec")]
    pub send_rate_per_sec: u32,

    /// Mirror every buffer append into the durable store.
    #[serde(default = "default_true")]
    pub durable_shadow: bool,

    /// Pause after each successful flush.
    #[serde(default = "default_post_flush_delay_ms")]
    pub post_flush_delay_ms: u64,

    /// Upper bound for any single transport call.
    #[serde(default = "default_transport_timeout_secs")]
    pub transport_timeout_secs: u64,

    /// Number of concurrent job workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// How often idle workers poll the job queue.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Added to `max(flush_timeout, batch_delay)` to decide a buffer is orphaned.
    #[serde(default = "default_orphan_safety_margin_secs")]
    pub orphan_safety_margin_secs: u64,

    /// How long sent or dropped shadow records are kept.
    #[serde(default = "default_shadow_retention_hours")]
    pub shadow_retention_hours: u64,

    #[serde(default = "default_config_cache_ttl_secs")]
    pub config_cache_ttl_secs: u64,

    #[serde(default = "default_thread_cache_ttl_secs")]
    pub thread_cache_ttl_secs: u64,

    #[serde(default = "default_user_state_cache_ttl_secs")]
    pub user_state_cache_ttl_secs: u64,

    /// Lifetime of the per-pair thread creation lock.
    #[serde(default = "default_thread_lock_ttl_secs")]
    pub thread_lock_ttl_secs: u64,

    /// How long a contending worker waits for another to finish creating a thread.
    #[serde(default = "default_thread_lock_wait_ms")]
    pub thread_lock_wait_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::default(),
            default_batch_size: default_batch_size(),
            default_batch_delay_secs: default_batch_delay_secs(),
            default_flush_timeout_secs: default_flush_timeout_secs(),
            max_buffer_items: default_max_buffer_items(),
            send_rate_per_sec: default_send_rate_per_sec(),
            durable_shadow: true,
            post_flush_delay_ms: default_post_flush_delay_ms(),
            transport_timeout_secs: default_transport_timeout_secs(),
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            orphan_safety_margin_secs: default_orphan_safety_margin_secs(),
            shadow_retention_hours: default_shadow_retention_hours(),
            config_cache_ttl_secs: default_config_cache_ttl_secs(),
            thread_cache_ttl_secs: default_thread_cache_ttl_secs(),
            user_state_cache_ttl_secs: default_user_state_cache_ttl_secs(),
            thread_lock_ttl_secs: default_thread_lock_ttl_secs(),
            thread_lock_wait_ms: default_thread_lock_wait_ms(),
        }
    }
}

impl RelayConfig {
    pub fn post_flush_delay(&self) -> Duration {
        Duration::from_millis(self.post_flush_delay_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff before retry number `attempt` (1-based): `retry_base_ms * 2^(attempt-1)`, capped.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self.retry_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.retry_max_ms))
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> u32 {
    10
}

fn default_batch_delay_secs() -> u64 {
    120
}

fn default_flush_timeout_secs() -> u64 {
    30
}

fn default_max_buffer_items() -> usize {
    200
}

fn default_send_rate_per_sec() -> u32 {
    20
}

fn default_post_flush_delay_ms() -> u64 {
    50
}

fn default_transport_timeout_secs() -> u64 {
    15
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_orphan_safety_margin_secs() -> u64 {
    30
}

fn default_shadow_retention_hours() -> u64 {
    72
}

fn default_config_cache_ttl_secs() -> u64 {
    600
}

fn default_thread_cache_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_user_state_cache_ttl_secs() -> u64 {
    3600
}

fn default_thread_lock_ttl_secs() -> u64 {
    30
}

fn default_thread_lock_wait_ms() -> u64 {
    5_000
}

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("mirrorline").join("mirrorline.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("mirrorline.db"))
        .to_string_lossy()
        .into_owned()
}

/// Telegram transport configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API tokens keyed by bot ID.
    #[serde(default)]
    pub bot_tokens: BTreeMap<String, String>,

    /// Alternative Bot API server URL (e.g. a local bot API server).
    #[serde(default)]
    pub api_url: Option<String>,

    /// Poll each configured bot for control-panel button presses.
    #[serde(default)]
    pub poll_callbacks: bool,
}

/// HTTP ingest gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on `/v1/*` routes. `None` disables the API routes.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
