// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decides, per incoming item, whether to flush now or arm a deferred flush.
//!
//! Flushes are durable jobs with dedupe keys. Re-arming the deferred flush
//! moves the pending job's due time (latest arm wins); nothing is cancelled,
//! because a flush that finds an empty buffer is a no-op.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mirrorline_config::model::RelayConfig;
use mirrorline_core::{
    BotId, DeliveryMode, MirrorConfig, MirrorError, NewJob, RelayItem, StorageAdapter, UserId,
};

use crate::buffer::BufferStore;

/// Job kind of a buffer flush.
pub const FLUSH_JOB: &str = "flush";

/// Payload of a flush job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushJob {
    pub bot_id: BotId,
    pub user_id: UserId,
}

/// What the scheduler did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// A flush job is due now.
    Immediate,
    /// The item waits for the deferred flush at `run_at`.
    Deferred { run_at: DateTime<Utc> },
}

pub struct BatchScheduler {
    storage: Arc<dyn StorageAdapter>,
    buffer: Arc<BufferStore>,
    delivery_mode: DeliveryMode,
    max_attempts: u32,
}

impl BatchScheduler {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        buffer: Arc<BufferStore>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            storage,
            buffer,
            delivery_mode: config.delivery_mode,
            max_attempts: config.max_attempts,
        }
    }

    /// Buffer `item` and schedule its delivery.
    ///
    /// Realtime mode still goes through the buffer so ordering and rate
    /// gating are the same for both modes.
    pub async fn submit(
        &self,
        bot: BotId,
        user: UserId,
        item: &RelayItem,
        config: &MirrorConfig,
    ) -> Result<Scheduled, MirrorError> {
        let appended = self.buffer.append(bot, user, item, config).await?;

        if self.delivery_mode == DeliveryMode::Realtime || appended.should_flush_now {
            self.schedule_now(bot, user, Utc::now()).await?;
            debug!(bot_id = %bot, user_id = %user, len = appended.len, "flush scheduled now");
            return Ok(Scheduled::Immediate);
        }

        self.arm(bot, user, appended.flush_at).await?;
        debug!(
            bot_id = %bot,
            user_id = %user,
            len = appended.len,
            run_at = %appended.flush_at,
            "deferred flush armed"
        );
        Ok(Scheduled::Deferred {
            run_at: appended.flush_at,
        })
    }

    /// Schedule a flush due at `at`, merged with any pending immediate flush.
    pub async fn schedule_now(
        &self,
        bot: BotId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> Result<i64, MirrorError> {
        self.enqueue(format!("flush-now:{bot}:{user}"), bot, user, at)
            .await
    }

    /// Arm (or move) the pair's deferred flush.
    pub async fn arm(
        &self,
        bot: BotId,
        user: UserId,
        run_at: DateTime<Utc>,
    ) -> Result<i64, MirrorError> {
        self.enqueue(format!("flush:{bot}:{user}"), bot, user, run_at)
            .await
    }

    async fn enqueue(
        &self,
        dedupe_key: String,
        bot: BotId,
        user: UserId,
        run_at: DateTime<Utc>,
    ) -> Result<i64, MirrorError> {
        let payload = serde_json::to_string(&FlushJob {
            bot_id: bot,
            user_id: user,
        })
        .map_err(|e| MirrorError::Internal(format!("flush payload encode: {e}")))?;
        self.storage
            .schedule_job(&NewJob {
                kind: FLUSH_JOB.to_string(),
                dedupe_key: Some(dedupe_key),
                payload,
                run_at,
                max_attempts: self.max_attempts,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use mirrorline_core::Role;

    use crate::test_support::{Fixture, test_relay_config};

    use super::*;

    fn item(content: &str) -> RelayItem {
        RelayItem::new(Role::User, content, Utc::now())
    }

    #[tokio::test]
    async fn below_threshold_arms_one_deferred_job() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 5).await;
        let scheduler = &fx.relay.scheduler;

        let first = scheduler
            .submit(BotId(7), UserId(42), &item("a"), &config)
            .await
            .unwrap();
        let second = scheduler
            .submit(BotId(7), UserId(42), &item("b"), &config)
            .await
            .unwrap();
        assert!(matches!(first, Scheduled::Deferred { .. }));
        assert!(matches!(second, Scheduled::Deferred { .. }));

        let far_future = Utc::now() + TimeDelta::hours(1);
        let jobs = fx.storage.claim_due_jobs(far_future, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].dedupe_key.as_deref(), Some("flush:7:42"));
        let payload: FlushJob = serde_json::from_str(&jobs[0].payload).unwrap();
        assert_eq!(payload, FlushJob { bot_id: BotId(7), user_id: UserId(42) });
    }

    #[tokio::test]
    async fn threshold_schedules_an_immediate_flush() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 2).await;
        let scheduler = &fx.relay.scheduler;

        scheduler.submit(BotId(7), UserId(42), &item("a"), &config).await.unwrap();
        let second = scheduler
            .submit(BotId(7), UserId(42), &item("b"), &config)
            .await
            .unwrap();
        assert_eq!(second, Scheduled::Immediate);

        let due = fx.storage.claim_due_jobs(Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].dedupe_key.as_deref(), Some("flush-now:7:42"));
    }

    #[tokio::test]
    async fn realtime_mode_flushes_every_message() {
        let fx = Fixture::with_config(mirrorline_config::model::RelayConfig {
            delivery_mode: DeliveryMode::Realtime,
            ..test_relay_config()
        })
        .await;
        let config = fx.configure(BotId(7), 10).await;

        let scheduled = fx
            .relay
            .scheduler
            .submit(BotId(7), UserId(42), &item("a"), &config)
            .await
            .unwrap();
        assert_eq!(scheduled, Scheduled::Immediate);
    }
}
