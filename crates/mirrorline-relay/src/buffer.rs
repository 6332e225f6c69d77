// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(bot, user) ordered log of pending relay items.
//!
//! The ephemeral list in the cache is primary. With durability on, every
//! append is also written to the pair's shadow record in the durable store.
//! Delivered items are acknowledged by ID. Shadow items missing from the
//! cache (lost with it) are merged back ahead of the live entries before a
//! flush or recovery pass drains the pair.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use mirrorline_cache::keys;
use mirrorline_config::model::RelayConfig;
use mirrorline_core::{
    BotId, CacheStore, MirrorConfig, MirrorError, RelayItem, StorageAdapter, UserId,
};

use crate::to_delta;

/// Result of appending one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Buffer length after the append.
    pub len: usize,
    /// The batch-size counter wrapped or the buffer hit its safety cap.
    pub should_flush_now: bool,
    /// When the pair's deferred flush is due.
    pub flush_at: DateTime<Utc>,
}

pub struct BufferStore {
    cache: Arc<dyn CacheStore>,
    storage: Arc<dyn StorageAdapter>,
    max_items: usize,
    durable: bool,
}

impl BufferStore {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        storage: Arc<dyn StorageAdapter>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            cache,
            storage,
            max_items: config.max_buffer_items,
            durable: config.durable_shadow,
        }
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub async fn append(
        &self,
        bot: BotId,
        user: UserId,
        item: &RelayItem,
        config: &MirrorConfig,
    ) -> Result<Appended, MirrorError> {
        let oldest = self
            .oldest(bot, user)
            .await?
            .unwrap_or(item.enqueued_at);

        let len = self
            .cache
            .list_push(&keys::buffer(bot, user), encode(item)?)
            .await?;
        let count = self
            .cache
            .incr(&keys::buffer_count(bot, user), None)
            .await?;

        let batch_size = i64::from(config.batch_size.max(1));
        let should_flush_now = count % batch_size == 0 || len >= self.max_items;
        let flush_at = if should_flush_now {
            item.enqueued_at
        } else {
            flush_deadline(config, oldest, item.enqueued_at)
        };

        if self.durable
            && let Err(e) = self
                .storage
                .shadow_append(bot, user, item, flush_at)
                .await
        {
            warn!(bot_id = %bot, user_id = %user, error = %e, "shadow append failed");
        }

        Ok(Appended {
            len,
            should_flush_now,
            flush_at,
        })
    }

    /// Atomically take every buffered item and reset the batch counter.
    pub async fn drain(&self, bot: BotId, user: UserId) -> Result<Vec<RelayItem>, MirrorError> {
        let raw = self.cache.list_take_all(&keys::buffer(bot, user)).await?;
        if let Err(e) = self.cache.delete(&keys::buffer_count(bot, user)).await {
            warn!(bot_id = %bot, user_id = %user, error = %e, "batch counter reset failed");
        }
        Ok(raw.iter().filter_map(|entry| decode(entry)).collect())
    }

    /// Put items back at the head of the buffer, ahead of anything appended since.
    pub async fn restore(
        &self,
        bot: BotId,
        user: UserId,
        items: &[RelayItem],
    ) -> Result<(), MirrorError> {
        if items.is_empty() {
            return Ok(());
        }
        let encoded = items.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        self.cache
            .list_prepend(&keys::buffer(bot, user), encoded)
            .await?;
        Ok(())
    }

    pub async fn len(&self, bot: BotId, user: UserId) -> Result<usize, MirrorError> {
        self.cache.list_len(&keys::buffer(bot, user)).await
    }

    /// Enqueue time of the oldest buffered item.
    pub async fn oldest(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<DateTime<Utc>>, MirrorError> {
        let head = self.cache.list_head(&keys::buffer(bot, user), 1).await?;
        Ok(head
            .first()
            .and_then(|entry| decode(entry))
            .map(|item| item.enqueued_at))
    }

    /// Lock the pair's shadow record while a flush is in flight. Returns the
    /// record's items, empty when there is none or the read failed.
    pub async fn claim_durable(
        &self,
        bot: BotId,
        user: UserId,
        until: DateTime<Utc>,
    ) -> Vec<RelayItem> {
        if !self.durable {
            return Vec::new();
        }
        let claimed = match self.storage.shadow_open(bot, user).await {
            Ok(Some(record)) => self
                .storage
                .shadow_mark_sending(record.id, until)
                .await
                .map(|()| record.items),
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(e),
        };
        claimed.unwrap_or_else(|e| {
            warn!(bot_id = %bot, user_id = %user, error = %e, "shadow claim failed");
            Vec::new()
        })
    }

    /// Prepend the `shadow` items the ephemeral buffer does not hold.
    ///
    /// `shadow` must be read before this call so every item appended since is
    /// already in the cache. Callers hold the pair's flush lock. Returns how
    /// many items were put back.
    pub async fn merge_shadow(
        &self,
        bot: BotId,
        user: UserId,
        shadow: &[RelayItem],
    ) -> Result<usize, MirrorError> {
        if shadow.is_empty() {
            return Ok(0);
        }
        let cached: HashSet<String> = self
            .cache
            .list_head(&keys::buffer(bot, user), usize::MAX)
            .await?
            .iter()
            .filter_map(|entry| decode(entry))
            .map(|item| item.id)
            .collect();
        let missing: Vec<RelayItem> = shadow
            .iter()
            .filter(|item| !cached.contains(&item.id))
            .cloned()
            .collect();
        self.restore(bot, user, &missing).await?;
        Ok(missing.len())
    }

    /// Mark `items` delivered. An empty slice just releases the claim.
    pub async fn acknowledge(&self, bot: BotId, user: UserId, items: &[RelayItem]) {
        if !self.durable {
            return;
        }
        if let Err(e) = self.storage.shadow_ack(bot, user, &ids(items)).await {
            warn!(bot_id = %bot, user_id = %user, count = items.len(), error = %e, "shadow ack failed");
        }
    }

    /// Mark `items` dropped.
    pub async fn abandon(&self, bot: BotId, user: UserId, items: &[RelayItem]) {
        if !self.durable {
            return;
        }
        if let Err(e) = self.storage.shadow_drop(bot, user, &ids(items)).await {
            warn!(bot_id = %bot, user_id = %user, count = items.len(), error = %e, "shadow drop failed");
        }
    }
}

fn ids(items: &[RelayItem]) -> Vec<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

/// Deferred flush time: a quiet period after the latest item, capped by how
/// long the oldest item may wait.
pub fn flush_deadline(
    config: &MirrorConfig,
    oldest: DateTime<Utc>,
    latest: DateTime<Utc>,
) -> DateTime<Utc> {
    let quiet = latest + to_delta(config.flush_timeout());
    let cap = oldest + to_delta(config.batch_delay());
    quiet.min(cap)
}

fn encode(item: &RelayItem) -> Result<String, MirrorError> {
    serde_json::to_string(item).map_err(|e| MirrorError::Internal(format!("relay item encode: {e}")))
}

fn decode(raw: &str) -> Option<RelayItem> {
    match serde_json::from_str(raw) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(error = %e, "skipping undecodable buffered item");
            None
        }
    }
}
