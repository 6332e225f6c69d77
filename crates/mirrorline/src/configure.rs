// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mirrorline configure` command implementation.
//!
//! Upserts the mirror configuration of one bot. A running relay picks the
//! change up once its cached copy expires (`relay.config_cache_ttl_secs`).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use mirrorline_cache::MemoryCache;
use mirrorline_config::model::{MirrorlineConfig, RelayConfig};
use mirrorline_core::{
    BotId, DestinationId, MirrorConfig, MirrorError, RoutingMode, StorageAdapter,
};
use mirrorline_relay::DestinationResolver;
use mirrorline_storage::SqliteStorage;

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Bot whose conversations are mirrored.
    pub bot_id: i64,

    /// Review group receiving the threads. Required for a new bot.
    #[arg(long, allow_hyphen_values = true)]
    pub destination: Option<String>,

    /// `individual` (one destination per bot) or `centralized`.
    #[arg(long)]
    pub routing: Option<String>,

    #[arg(long)]
    pub batch_size: Option<u32>,

    #[arg(long)]
    pub batch_delay_secs: Option<u64>,

    #[arg(long)]
    pub flush_timeout_secs: Option<u64>,

    /// Stop mirroring this bot without deleting its configuration.
    #[arg(long, conflicts_with = "activate")]
    pub deactivate: bool,

    #[arg(long)]
    pub activate: bool,
}

pub async fn run_configure(
    config: &MirrorlineConfig,
    args: ConfigureArgs,
) -> Result<(), MirrorError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

    let resolver = DestinationResolver::new(
        Arc::clone(&storage),
        Arc::new(MemoryCache::new()),
        Duration::from_secs(config.relay.config_cache_ttl_secs),
    );

    let bot = BotId(args.bot_id);
    let existing = storage.get_mirror_config(bot).await?;
    let updated = apply(existing, bot, &args, &config.relay)?;
    resolver.store(&updated).await?;

    println!(
        "bot {bot}: destination={} routing={} batch_size={} batch_delay={}s flush_timeout={}s active={}",
        updated.destination,
        updated.routing_mode,
        updated.batch_size,
        updated.batch_delay_secs,
        updated.flush_timeout_secs,
        updated.active,
    );
    Ok(())
}

/// Overlay the command-line flags on the stored configuration.
fn apply(
    existing: Option<MirrorConfig>,
    bot: BotId,
    args: &ConfigureArgs,
    defaults: &RelayConfig,
) -> Result<MirrorConfig, MirrorError> {
    let mut config = match (existing, &args.destination) {
        (Some(config), _) => config,
        (None, Some(destination)) => MirrorConfig {
            batch_size: defaults.default_batch_size,
            batch_delay_secs: defaults.default_batch_delay_secs,
            flush_timeout_secs: defaults.default_flush_timeout_secs,
            ..MirrorConfig::new(bot, DestinationId(destination.clone()))
        },
        (None, None) => {
            return Err(MirrorError::Config(format!(
                "bot {bot} has no mirror configuration yet; --destination is required"
            )));
        }
    };

    if let Some(destination) = &args.destination {
        config.destination = DestinationId(destination.clone());
    }
    if let Some(routing) = &args.routing {
        config.routing_mode = RoutingMode::from_str(routing).map_err(|_| {
            MirrorError::Config(format!(
                "unknown routing mode `{routing}` (expected individual or centralized)"
            ))
        })?;
    }
    if let Some(batch_size) = args.batch_size {
        if batch_size == 0 {
            return Err(MirrorError::Config("--batch-size must be at least 1".into()));
        }
        config.batch_size = batch_size;
    }
    if let Some(delay) = args.batch_delay_secs {
        config.batch_delay_secs = delay;
    }
    if let Some(timeout) = args.flush_timeout_secs {
        config.flush_timeout_secs = timeout;
    }
    if args.deactivate {
        config.active = false;
    } else if args.activate {
        config.active = true;
    }
    Ok(config)
}
