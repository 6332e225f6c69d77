// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mirrorline.toml` > `~/.config/mirrorline/mirrorline.toml`
//! > `/etc/mirrorline/mirrorline.toml`, with environment variable overrides via the
//! `MIRRORLINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MirrorlineConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mirrorline/mirrorline.toml` (system-wide)
/// 3. `~/.config/mirrorline/mirrorline.toml` (user XDG config)
/// 4. `./mirrorline.toml` (local directory)
/// 5. `MIRRORLINE_*` environment variables
pub fn load_config() -> Result<MirrorlineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MirrorlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MirrorlineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MirrorlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MirrorlineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MirrorlineConfig::default()))
        .merge(Toml::file("/etc/mirrorline/mirrorline.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mirrorline/mirrorline.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mirrorline.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")`: key names contain
/// underscores, so `MIRRORLINE_RELAY_BATCH_SIZE` must become
/// `relay.batch_size`, not `relay.batch.size`.
fn env_provider() -> Env {
    Env::prefixed("MIRRORLINE_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 6] = ["agent", "relay", "storage", "telegram", "gateway", "prometheus"];
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
