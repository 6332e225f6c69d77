// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drains a pair's buffer and delivers it to the pair's review thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use mirrorline_cache::keys;
use mirrorline_config::model::RelayConfig;
use mirrorline_core::{
    BotId, CacheStore, MirrorConfig, MirrorError, RelayItem, StorageAdapter, ThreadHandle,
    TransportClient, UserId,
};
use mirrorline_prometheus as metrics;

use crate::buffer::BufferStore;
use crate::rate::{RateDecision, RateGate};
use crate::registry::ThreadRegistry;
use crate::render::render_batch;
use crate::resolver::DestinationResolver;
use crate::{bounded, to_delta};

/// Flush and shadow leases last this many transport timeouts.
const LEASE_TIMEOUTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Delivered { items: usize, chunks: usize },
    /// Nothing was buffered.
    Empty,
    /// The bot's send window is exhausted; nothing was drained.
    RateLimited { retry_after: Duration },
    /// Another worker is flushing this pair.
    Busy,
    /// The batch was abandoned (no active config, or retries exhausted).
    Dropped { items: usize },
}

impl FlushOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Empty => "empty",
            Self::RateLimited { .. } => "rate_limited",
            Self::Busy => "busy",
            Self::Dropped { .. } => "dropped",
        }
    }
}

struct DeliveryFailure {
    /// Items fully delivered before the failure.
    delivered: usize,
    handle: Option<ThreadHandle>,
    error: MirrorError,
}

pub struct FlushExecutor {
    cache: Arc<dyn CacheStore>,
    storage: Arc<dyn StorageAdapter>,
    transport: Arc<dyn TransportClient>,
    resolver: Arc<DestinationResolver>,
    registry: Arc<ThreadRegistry>,
    buffer: Arc<BufferStore>,
    rate: RateGate,
    transport_timeout: Duration,
    post_flush_delay: Duration,
}

impl FlushExecutor {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        storage: Arc<dyn StorageAdapter>,
        transport: Arc<dyn TransportClient>,
        resolver: Arc<DestinationResolver>,
        registry: Arc<ThreadRegistry>,
        buffer: Arc<BufferStore>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            rate: RateGate::new(Arc::clone(&cache), config.send_rate_per_sec),
            cache,
            storage,
            transport,
            resolver,
            registry,
            buffer,
            transport_timeout: config.transport_timeout(),
            post_flush_delay: config.post_flush_delay(),
        }
    }

    /// Deliver everything buffered for the pair.
    ///
    /// On a delivery failure the undelivered items go back to the head of the
    /// buffer and the error is returned for retry, unless `final_attempt` is
    /// set, in which case they are dropped.
    pub async fn flush(
        &self,
        bot: BotId,
        user: UserId,
        final_attempt: bool,
    ) -> Result<FlushOutcome, MirrorError> {
        let lock_key = keys::flush_lock(bot, user);
        if !self
            .cache
            .set_nx(&lock_key, "1".into(), self.lease())
            .await?
        {
            debug!(bot_id = %bot, user_id = %user, "flush already running");
            return Ok(FlushOutcome::Busy);
        }

        let result = self.flush_locked(bot, user, final_attempt).await;
        if let Err(e) = self.cache.delete(&lock_key).await {
            warn!(key = %lock_key, error = %e, "failed to release flush lock");
        }

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "failed",
        };
        metrics::record_flush(label);
        result
    }

    fn lease(&self) -> Duration {
        self.transport_timeout * LEASE_TIMEOUTS
    }

    async fn flush_locked(
        &self,
        bot: BotId,
        user: UserId,
        final_attempt: bool,
    ) -> Result<FlushOutcome, MirrorError> {
        if self.buffer.len(bot, user).await? == 0 {
            return Ok(FlushOutcome::Empty);
        }
        if let RateDecision::Limited { retry_after } = self.rate.acquire(bot, Utc::now()).await {
            return Ok(FlushOutcome::RateLimited { retry_after });
        }

        // Claim the shadow before draining so the sweeper never restores a
        // batch that is in flight.
        let shadow = self
            .buffer
            .claim_durable(bot, user, Utc::now() + to_delta(self.lease()))
            .await;
        match self.buffer.merge_shadow(bot, user, &shadow).await {
            Ok(0) => {}
            Ok(merged) => info!(bot_id = %bot, user_id = %user, merged, "merged lost shadow items"),
            Err(e) => warn!(bot_id = %bot, user_id = %user, error = %e, "shadow merge failed"),
        }
        let items = self.buffer.drain(bot, user).await?;
        if items.is_empty() {
            self.buffer.acknowledge(bot, user, &[]).await;
            return Ok(FlushOutcome::Empty);
        }

        let Some(config) = self.resolver.resolve(bot).await else {
            self.buffer.abandon(bot, user, &items).await;
            warn!(
                bot_id = %bot,
                user_id = %user,
                items = items.len(),
                "mirroring disabled, dropping batch"
            );
            return Ok(FlushOutcome::Dropped { items: items.len() });
        };

        let started = Instant::now();
        match self.deliver(bot, user, &config, &items).await {
            Ok((handle, chunks)) => {
                self.buffer.acknowledge(bot, user, &items).await;
                self.record_progress(&handle, items.len()).await;
                metrics::record_items_delivered(items.len() as u64);
                metrics::record_flush_latency(started.elapsed().as_secs_f64());
                info!(
                    bot_id = %bot,
                    user_id = %user,
                    thread_id = %handle.thread_id,
                    items = items.len(),
                    chunks,
                    "batch delivered"
                );
                if !self.post_flush_delay.is_zero() {
                    tokio::time::sleep(self.post_flush_delay).await;
                }
                Ok(FlushOutcome::Delivered {
                    items: items.len(),
                    chunks,
                })
            }
            Err(failure) => self.recover(bot, user, items, failure, final_attempt).await,
        }
    }

    async fn deliver(
        &self,
        bot: BotId,
        user: UserId,
        config: &MirrorConfig,
        items: &[RelayItem],
    ) -> Result<(ThreadHandle, usize), DeliveryFailure> {
        let handle = self
            .registry
            .ensure_thread(bot, user, config)
            .await
            .map_err(|error| DeliveryFailure {
                delivered: 0,
                handle: None,
                error,
            })?;

        let chunks = render_batch(items, self.transport.max_message_length());
        let mut delivered = 0;
        for chunk in &chunks {
            let posted = bounded(
                self.transport_timeout,
                self.transport.post_message(
                    bot,
                    &handle.destination,
                    &handle.thread_id,
                    &chunk.text,
                    None,
                ),
            )
            .await;
            if let Err(error) = posted {
                return Err(DeliveryFailure {
                    delivered,
                    handle: Some(handle),
                    error,
                });
            }
            delivered += chunk.item_count;
        }
        Ok((handle, chunks.len()))
    }

    async fn recover(
        &self,
        bot: BotId,
        user: UserId,
        items: Vec<RelayItem>,
        failure: DeliveryFailure,
        final_attempt: bool,
    ) -> Result<FlushOutcome, MirrorError> {
        let DeliveryFailure {
            delivered,
            handle,
            error,
        } = failure;

        if let Some(handle) = &handle {
            if delivered > 0 {
                self.record_progress(handle, delivered).await;
                metrics::record_items_delivered(delivered as u64);
            }
            if error.is_thread_gone()
                && let Err(e) = self.registry.forget(handle).await
            {
                warn!(record_id = handle.record_id, error = %e, "failed to forget gone thread");
            }
        }

        let (sent, rest) = items.split_at(delivered);
        if final_attempt {
            self.buffer.acknowledge(bot, user, sent).await;
            self.buffer.abandon(bot, user, rest).await;
            error!(
                bot_id = %bot,
                user_id = %user,
                dropped = rest.len(),
                error = %error,
                "delivery retries exhausted, dropping batch"
            );
            return Ok(FlushOutcome::Dropped { items: rest.len() });
        }

        if let Err(e) = self.buffer.restore(bot, user, rest).await {
            error!(
                bot_id = %bot,
                user_id = %user,
                items = rest.len(),
                error = %e,
                "failed to restore undelivered items"
            );
        }
        // Releases the shadow claim even when nothing was delivered.
        self.buffer.acknowledge(bot, user, sent).await;
        warn!(
            bot_id = %bot,
            user_id = %user,
            delivered,
            restored = rest.len(),
            error = %error,
            "delivery failed, batch restored"
        );
        Err(error)
    }

    async fn record_progress(&self, handle: &ThreadHandle, delivered: usize) {
        if let Err(e) = self
            .storage
            .record_flush(handle.record_id, delivered as i64, Utc::now())
            .await
        {
            warn!(record_id = handle.record_id, error = %e, "thread counters not updated");
        }
    }
}

#[cfg(test)]
mod tests {
    use mirrorline_core::{Role, TransportErrorKind};

    use crate::test_support::Fixture;

    use super::*;

    async fn buffer_items(fx: &Fixture, config: &MirrorConfig, texts: &[&str]) {
        for text in texts {
            fx.relay
                .buffer
                .append(config.bot_id, UserId(42), &RelayItem::new(Role::User, *text, Utc::now()), config)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_updates_counters() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 10).await;
        buffer_items(&fx, &config, &["hi", "there"]).await;

        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Delivered { items: 2, chunks: 1 });

        let batches = fx.transport.batches().await;
        assert_eq!(batches.len(), 1);
        assert!(batches[0].find("hi").unwrap() < batches[0].find("there").unwrap());

        let handle = fx.storage.get_thread(BotId(7), UserId(42)).await.unwrap().unwrap();
        assert_eq!(handle.messages_relayed, 2);
        assert!(handle.last_flush_at.is_some());
        assert!(fx.storage.shadow_open(BotId(7), UserId(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn items_lost_with_the_cache_are_delivered_once_alongside_new_traffic() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 10).await;
        buffer_items(&fx, &config, &["old1", "old2"]).await;
        fx.cache.clear();

        // The shadow is not overdue yet, so recovery leaves it alone.
        let report = fx.relay.sweeper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.from_durable, 0);

        buffer_items(&fx, &config, &["new"]).await;
        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Delivered { items: 3, chunks: 1 });
        assert!(fx.storage.shadow_open(BotId(7), UserId(42)).await.unwrap().is_none());

        let later = Utc::now() + chrono::TimeDelta::hours(1);
        let report = fx.relay.sweeper.sweep(later).await.unwrap();
        assert_eq!(report.from_durable, 0);
        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Empty);

        let batches = fx.transport.batches().await;
        assert_eq!(batches.len(), 1);
        let text = &batches[0];
        for content in ["old1", "old2", "new"] {
            assert_eq!(text.matches(content).count(), 1, "{content} in {text}");
        }
        assert!(text.find("old1").unwrap() < text.find("old2").unwrap());
        assert!(text.find("old2").unwrap() < text.find("new").unwrap());
    }

    #[tokio::test]
    async fn partial_delivery_acknowledges_only_the_sent_items() {
        let fx = Fixture::new().await;
        // Header, first item and second item each need their own chunk.
        fx.transport.max_len.store(100, std::sync::atomic::Ordering::SeqCst);
        let config = fx.configure(BotId(7), 10).await;
        let first = "a".repeat(60);
        let second = "b".repeat(60);
        buffer_items(&fx, &config, &[first.as_str(), second.as_str()]).await;
        fx.transport.fail_after_posts(2, TransportErrorKind::Transient).await;

        let err = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap_err();
        assert!(err.is_retryable());
        let shadow = fx.storage.shadow_open(BotId(7), UserId(42)).await.unwrap().unwrap();
        assert_eq!(shadow.items.len(), 1);
        assert_eq!(shadow.items[0].content, second);
        assert_eq!(fx.relay.buffer.len(BotId(7), UserId(42)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_buffer_is_a_no_op() {
        let fx = Fixture::new().await;
        fx.configure(BotId(7), 10).await;
        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Empty);
        assert!(fx.transport.threads.lock().await.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_restores_the_batch() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 10).await;
        buffer_items(&fx, &config, &["a", "b"]).await;
        fx.transport.fail_next_posts([TransportErrorKind::Transient]).await;

        let err = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(fx.relay.buffer.len(BotId(7), UserId(42)).await.unwrap(), 2);
        let shadow = fx.storage.shadow_open(BotId(7), UserId(42)).await.unwrap().unwrap();
        assert_eq!(shadow.items.len(), 2);

        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Delivered { items: 2, chunks: 1 });
        assert_eq!(fx.transport.batches().await.len(), 1);
    }

    #[tokio::test]
    async fn final_attempt_drops_instead_of_restoring() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 10).await;
        buffer_items(&fx, &config, &["a"]).await;
        fx.transport.fail_next_posts([TransportErrorKind::Permanent]).await;

        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), true).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Dropped { items: 1 });
        assert_eq!(fx.relay.buffer.len(BotId(7), UserId(42)).await.unwrap(), 0);
        assert!(fx.storage.shadow_open(BotId(7), UserId(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn thread_gone_forgets_the_mapping() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 10).await;
        buffer_items(&fx, &config, &["a"]).await;
        fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();

        buffer_items(&fx, &config, &["b"]).await;
        fx.transport.fail_next_posts([TransportErrorKind::ThreadGone]).await;
        let err = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap_err();
        assert!(err.is_thread_gone());
        assert!(fx.storage.get_thread(BotId(7), UserId(42)).await.unwrap().is_none());

        fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        assert_eq!(fx.transport.threads.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn missing_config_drops_the_batch() {
        let fx = Fixture::new().await;
        let mut config = fx.configure(BotId(7), 10).await;
        buffer_items(&fx, &config, &["a", "b"]).await;
        config.active = false;
        fx.relay.resolver.store(&config).await.unwrap();

        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Dropped { items: 2 });
        assert!(fx.transport.posts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_rate_window_leaves_the_buffer_alone() {
        let fx = Fixture::with_config(RelayConfig {
            send_rate_per_sec: 1,
            ..crate::test_support::test_relay_config()
        })
        .await;
        let config = fx.configure(BotId(7), 10).await;
        buffer_items(&fx, &config, &["a"]).await;
        // Burn the current window's only token.
        fx.relay.executor.rate.acquire(BotId(7), Utc::now()).await;

        let outcome = fx.relay.executor.flush(BotId(7), UserId(42), false).await.unwrap();
        if let FlushOutcome::RateLimited { retry_after } = outcome {
            assert!(retry_after <= Duration::from_secs(1));
            assert_eq!(fx.relay.buffer.len(BotId(7), UserId(42)).await.unwrap(), 1);
        } else {
            // The wall clock crossed into a new window between the two calls.
            assert!(matches!(outcome, FlushOutcome::Delivered { .. }));
        }
    }
}
