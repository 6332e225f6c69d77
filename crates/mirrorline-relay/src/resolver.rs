// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot ID to active mirror configuration, cached in front of the durable store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mirrorline_cache::{TypedCache, keys};
use mirrorline_core::{BotId, CacheStore, MirrorConfig, MirrorError, StorageAdapter};

pub struct DestinationResolver {
    storage: Arc<dyn StorageAdapter>,
    configs: TypedCache<MirrorConfig>,
}

impl DestinationResolver {
    pub fn new(storage: Arc<dyn StorageAdapter>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            storage,
            configs: TypedCache::new(cache, keys::CONFIG_PREFIX, ttl),
        }
    }

    /// Active configuration for `bot`, or `None` when mirroring is off.
    ///
    /// Durable read errors are logged and treated as "not configured".
    pub async fn resolve(&self, bot: BotId) -> Option<MirrorConfig> {
        let storage = Arc::clone(&self.storage);
        let loaded = self
            .configs
            .get_or_load(&keys::config(bot), || async move {
                storage.get_mirror_config(bot).await
            })
            .await;

        match loaded {
            Ok(Some(config)) if config.active => Some(config),
            Ok(_) => {
                debug!(bot_id = %bot, "no active mirror config");
                None
            }
            Err(e) => {
                warn!(bot_id = %bot, error = %e, "mirror config lookup failed");
                None
            }
        }
    }

    /// Drop the cached configuration so the next read hits the durable store.
    pub async fn invalidate(&self, bot: BotId) -> Result<(), MirrorError> {
        self.configs.invalidate(&keys::config(bot)).await
    }

    /// Persist `config`, then invalidate its cache entry.
    pub async fn store(&self, config: &MirrorConfig) -> Result<(), MirrorError> {
        self.storage.upsert_mirror_config(config).await?;
        if let Err(e) = self.invalidate(config.bot_id).await {
            warn!(bot_id = %config.bot_id, error = %e, "config cache invalidation failed");
        }
        Ok(())
    }
}
