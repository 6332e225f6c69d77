// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mirrorline doctor` command implementation.
//!
//! Runs diagnostic checks against the storage, cache, transport and gateway
//! to surface configuration and connectivity problems.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use mirrorline_cache::MemoryCache;
use mirrorline_config::model::MirrorlineConfig;
use mirrorline_core::{
    CredentialProvider, HealthStatus, MirrorError, PluginAdapter, StorageAdapter,
};
use mirrorline_storage::SqliteStorage;
use mirrorline_telegram::{ConfigCredentials, TelegramTransport};

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }

    fn from_health(name: &str, health: Result<HealthStatus, MirrorError>, start: Instant) -> Self {
        match health {
            Ok(HealthStatus::Healthy) => Self::new(name, CheckStatus::Pass, "healthy", start),
            Ok(HealthStatus::Degraded(reason)) => Self::new(name, CheckStatus::Warn, reason, start),
            Ok(HealthStatus::Unhealthy(reason)) => Self::new(name, CheckStatus::Fail, reason, start),
            Err(e) => Self::new(name, CheckStatus::Fail, e.to_string(), start),
        }
    }
}

/// Run the `mirrorline doctor` command. With `plain`, disables colored output.
pub async fn run_doctor(config: &MirrorlineConfig, plain: bool) -> Result<(), MirrorError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let mut results = Vec::new();
    results.push(check_cache().await);
    results.extend(check_database(config).await);
    results.push(check_transport(config).await);
    results.push(check_health_endpoint(config).await);

    println!();
    println!("  mirrorline doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in &results {
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{}", render_line(result, use_color));
    }

    println!();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if !use_color {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        return format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        );
    }

    use colored::Colorize;
    let (symbol, message) = match result.status {
        CheckStatus::Pass => ("✓".green(), result.message.normal()),
        CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
        CheckStatus::Fail => ("✗".red(), result.message.red()),
    };
    format!(
        "    {symbol} {:<20} {message} ({duration_ms}ms)",
        result.name
    )
}

async fn check_cache() -> CheckResult {
    let start = Instant::now();
    let cache = MemoryCache::new();
    CheckResult::from_health("Cache", cache.health_check().await, start)
}

/// Database connectivity, then the stored mirror configurations.
async fn check_database(config: &MirrorlineConfig) -> Vec<CheckResult> {
    let start = Instant::now();
    let db_path = &config.storage.database_path;

    if !std::path::Path::new(db_path).exists() {
        return vec![CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        )];
    }

    let storage = SqliteStorage::new(config.storage.clone());
    if let Err(e) = storage.initialize().await {
        return vec![CheckResult::new(
            "Database",
            CheckStatus::Fail,
            format!("open failed: {e}"),
            start,
        )];
    }
    let mut results = vec![CheckResult::from_health(
        "Database",
        storage.health_check().await,
        start,
    )];

    let start = Instant::now();
    let configs = match storage.list_mirror_configs().await {
        Ok(configs) => configs,
        Err(e) => {
            results.push(CheckResult::new(
                "Mirror configs",
                CheckStatus::Fail,
                format!("query failed: {e}"),
                start,
            ));
            return results;
        }
    };

    let credentials = ConfigCredentials::from_config(&config.telegram).ok();
    let mut missing = Vec::new();
    for mirror in configs.iter().filter(|c| c.active) {
        let has_token = match &credentials {
            Some(creds) => matches!(creds.token(mirror.bot_id).await, Ok(Some(_))),
            None => false,
        };
        if !has_token {
            missing.push(mirror.bot_id.to_string());
        }
    }

    let active = configs.iter().filter(|c| c.active).count();
    results.push(if configs.is_empty() {
        CheckResult::new(
            "Mirror configs",
            CheckStatus::Warn,
            "none (use `mirrorline configure`)",
            start,
        )
    } else if !missing.is_empty() {
        CheckResult::new(
            "Mirror configs",
            CheckStatus::Warn,
            format!("no API token for bot(s) {}", missing.join(", ")),
            start,
        )
    } else {
        CheckResult::new(
            "Mirror configs",
            CheckStatus::Pass,
            format!("{active} active of {}", configs.len()),
            start,
        )
    });

    let _ = storage.close().await;
    results
}

/// Reach every configured bot through the Bot API.
async fn check_transport(config: &MirrorlineConfig) -> CheckResult {
    let start = Instant::now();

    let credentials = match ConfigCredentials::from_config(&config.telegram) {
        Ok(credentials) => std::sync::Arc::new(credentials),
        Err(e) => return CheckResult::new("Telegram", CheckStatus::Fail, e.to_string(), start),
    };
    let bots: Vec<_> = credentials.bots().collect();
    if bots.is_empty() {
        return CheckResult::new(
            "Telegram",
            CheckStatus::Warn,
            "no bot tokens configured",
            start,
        );
    }

    let transport = match TelegramTransport::new(&config.telegram, credentials) {
        Ok(transport) => transport,
        Err(e) => return CheckResult::new("Telegram", CheckStatus::Fail, e.to_string(), start),
    };
    for bot in bots {
        if let Err(e) = transport.bot(bot).await {
            return CheckResult::new("Telegram", CheckStatus::Fail, e.to_string(), start);
        }
    }
    CheckResult::from_health("Telegram", transport.health_check().await, start)
}

async fn check_health_endpoint(config: &MirrorlineConfig) -> CheckResult {
    let start = Instant::now();

    if !config.gateway.enabled {
        return CheckResult::new("Gateway", CheckStatus::Pass, "disabled", start);
    }

    let url = format!("http://{}:{}/health", config.gateway.host, config.gateway.port);
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return CheckResult::new(
                "Gateway",
                CheckStatus::Fail,
                format!("HTTP client error: {e}"),
                start,
            );
        }
    };

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            CheckResult::new("Gateway", CheckStatus::Pass, "reachable", start)
        }
        Ok(resp) => CheckResult::new(
            "Gateway",
            CheckStatus::Warn,
            format!("status {}", resp.status()),
            start,
        ),
        Err(_) => CheckResult::new(
            "Gateway",
            CheckStatus::Warn,
            format!("not reachable at {url} (relay may not be running)"),
            start,
        ),
    }
}
