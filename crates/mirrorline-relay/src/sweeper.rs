// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery sweeper: re-arms buffers whose flush job was lost.
//!
//! Two sources are reconciled. Durable shadow records that are overdue (or
//! whose sending lock expired) have their items merged back into the
//! ephemeral buffer by ID and are flushed; ephemeral buffers whose oldest
//! item is older than the orphan threshold are flushed. The sweep also requeues stale jobs and prunes old
//! shadow rows. Every step is safe to run while traffic flows.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mirrorline_cache::keys;
use mirrorline_config::model::RelayConfig;
use mirrorline_core::{BotId, CacheStore, MirrorError, StorageAdapter, UserId};
use mirrorline_prometheus as metrics;

use crate::buffer::BufferStore;
use crate::resolver::DestinationResolver;
use crate::scheduler::BatchScheduler;
use crate::to_delta;

/// Durable records examined per sweep.
const DURABLE_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Ephemeral buffers re-armed.
    pub from_cache: usize,
    /// Shadow records restored into the cache.
    pub from_durable: usize,
    pub requeued_jobs: u64,
    pub pruned: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct RecoverySweeper {
    storage: Arc<dyn StorageAdapter>,
    cache: Arc<dyn CacheStore>,
    buffer: Arc<BufferStore>,
    resolver: Arc<DestinationResolver>,
    scheduler: Arc<BatchScheduler>,
    interval: Duration,
    margin: Duration,
    retention: Duration,
    lease: Duration,
    default_timeout: Duration,
    default_delay: Duration,
}

impl RecoverySweeper {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        cache: Arc<dyn CacheStore>,
        buffer: Arc<BufferStore>,
        resolver: Arc<DestinationResolver>,
        scheduler: Arc<BatchScheduler>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            storage,
            cache,
            buffer,
            resolver,
            scheduler,
            interval: config.sweep_interval(),
            margin: Duration::from_secs(config.orphan_safety_margin_secs),
            retention: Duration::from_secs(config.shadow_retention_hours * 3600),
            lease: config.transport_timeout() * 10,
            default_timeout: Duration::from_secs(config.default_flush_timeout_secs),
            default_delay: Duration::from_secs(config.default_batch_delay_secs),
        }
    }

    /// Run one reconciliation pass as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, MirrorError> {
        let mut handled = HashSet::new();
        let from_durable = if self.buffer.is_durable() {
            self.sweep_durable(now, &mut handled).await?
        } else {
            0
        };
        let from_cache = self.sweep_cache(now, &handled).await?;
        let requeued_jobs = self.storage.requeue_stale_jobs(now).await?;
        let pruned = self
            .storage
            .shadow_prune(now - to_delta(self.retention))
            .await?;

        metrics::record_recovered("durable", from_durable as u64);
        metrics::record_recovered("cache", from_cache as u64);

        Ok(SweepReport {
            from_cache,
            from_durable,
            requeued_jobs,
            pruned,
        })
    }

    /// Sweep at startup, then every interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.sweep(Utc::now()).await {
                    Ok(report) if !report.is_empty() => info!(
                        from_cache = report.from_cache,
                        from_durable = report.from_durable,
                        requeued_jobs = report.requeued_jobs,
                        pruned = report.pruned,
                        "recovery sweep"
                    ),
                    Ok(_) => debug!("recovery sweep found nothing"),
                    Err(e) => warn!(error = %e, "recovery sweep failed"),
                },
            }
        }
        debug!("recovery sweeper stopped");
    }

    async fn sweep_durable(
        &self,
        now: DateTime<Utc>,
        handled: &mut HashSet<(BotId, UserId)>,
    ) -> Result<usize, MirrorError> {
        let due = self
            .storage
            .shadow_due(now - to_delta(self.margin), DURABLE_BATCH)
            .await?;

        let mut restored = 0;
        for record in due {
            let (bot, user) = (record.bot_id, record.user_id);
            handled.insert((bot, user));

            // A running flush owns the pair and merges the shadow itself.
            let lock_key = keys::flush_lock(bot, user);
            if !self.cache.set_nx(&lock_key, "sweeper".into(), self.lease).await? {
                debug!(bot_id = %bot, user_id = %user, "flush running, skipping shadow");
                continue;
            }
            let result = self.recover_shadow(bot, user, now).await;
            if let Err(e) = self.cache.delete(&lock_key).await {
                warn!(key = %lock_key, error = %e, "failed to release flush lock");
            }
            if result? > 0 {
                restored += 1;
            }
        }
        Ok(restored)
    }

    /// Merge the pair's open shadow into its buffer and schedule a flush.
    /// Called with the pair's flush lock held. Returns the items merged.
    async fn recover_shadow(
        &self,
        bot: BotId,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<usize, MirrorError> {
        // Re-read under the lock: a flush may have acknowledged items since
        // the due scan. The shadow is read before the cache.
        let Some(record) = self.storage.shadow_open(bot, user).await? else {
            return Ok(0);
        };
        let merged = self.buffer.merge_shadow(bot, user, &record.items).await?;
        if merged > 0 {
            info!(bot_id = %bot, user_id = %user, items = merged, "restored shadow buffer");
        }
        self.storage
            .shadow_mark_sending(record.id, now + to_delta(self.lease))
            .await?;
        self.scheduler.schedule_now(bot, user, now).await?;
        Ok(merged)
    }

    async fn sweep_cache(
        &self,
        now: DateTime<Utc>,
        handled: &HashSet<(BotId, UserId)>,
    ) -> Result<usize, MirrorError> {
        let mut rearmed = 0;
        for key in self.cache.keys_with_prefix(keys::BUFFER_PREFIX).await? {
            let Some((bot, user)) = keys::parse_buffer_key(&key) else {
                continue;
            };
            if handled.contains(&(bot, user)) {
                continue;
            }
            let Some(oldest) = self.buffer.oldest(bot, user).await? else {
                continue;
            };
            if now - oldest >= to_delta(self.orphan_threshold(bot).await) {
                self.scheduler.schedule_now(bot, user, now).await?;
                rearmed += 1;
                debug!(bot_id = %bot, user_id = %user, %oldest, "re-armed orphan buffer");
            }
        }
        Ok(rearmed)
    }

    /// Age past which a buffered item is considered abandoned.
    async fn orphan_threshold(&self, bot: BotId) -> Duration {
        let (timeout, delay) = match self.resolver.resolve(bot).await {
            Some(config) => (config.flush_timeout(), config.batch_delay()),
            None => (self.default_timeout, self.default_delay),
        };
        timeout.max(delay) + self.margin
    }
}
