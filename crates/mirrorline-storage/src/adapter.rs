// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use mirrorline_config::model::StorageConfig;
use mirrorline_core::{
    AdapterType, BotId, HealthStatus, Job, JobStatus, MessageId, MirrorConfig, MirrorError,
    NewJob, NewThread, PluginAdapter, RelayItem, ShadowBuffer, StorageAdapter, ThreadHandle,
    UserId, UserMirrorState,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed durable store.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules. The
/// database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, MirrorError> {
        self.db.get().ok_or_else(|| MirrorError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), MirrorError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| MirrorError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MirrorError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Mirror configuration ---

    async fn get_mirror_config(&self, bot: BotId) -> Result<Option<MirrorConfig>, MirrorError> {
        queries::configs::get_config(self.db()?, bot).await
    }

    async fn upsert_mirror_config(&self, config: &MirrorConfig) -> Result<(), MirrorError> {
        queries::configs::upsert_config(self.db()?, config).await
    }

    async fn list_mirror_configs(&self) -> Result<Vec<MirrorConfig>, MirrorError> {
        queries::configs::list_configs(self.db()?).await
    }

    // --- Thread mappings ---

    async fn get_thread(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<ThreadHandle>, MirrorError> {
        queries::threads::get_thread(self.db()?, bot, user).await
    }

    async fn get_thread_by_record(
        &self,
        record_id: i64,
    ) -> Result<Option<ThreadHandle>, MirrorError> {
        queries::threads::get_thread_by_record(self.db()?, record_id).await
    }

    async fn insert_thread(&self, thread: &NewThread) -> Result<ThreadHandle, MirrorError> {
        queries::threads::insert_thread(self.db()?, thread).await
    }

    async fn set_control_message(
        &self,
        record_id: i64,
        message_id: &MessageId,
    ) -> Result<(), MirrorError> {
        queries::threads::set_control_message(self.db()?, record_id, message_id).await
    }

    async fn record_flush(
        &self,
        record_id: i64,
        delivered: i64,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorError> {
        queries::threads::record_flush(self.db()?, record_id, delivered, at).await
    }

    async fn delete_thread(&self, record_id: i64) -> Result<(), MirrorError> {
        queries::threads::delete_thread(self.db()?, record_id).await
    }

    // --- User state ---

    async fn get_user_state(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<UserMirrorState>, MirrorError> {
        queries::user_states::get_user_state(self.db()?, bot, user).await
    }

    async fn upsert_user_state(
        &self,
        bot: BotId,
        user: UserId,
        state: UserMirrorState,
    ) -> Result<(), MirrorError> {
        queries::user_states::upsert_user_state(self.db()?, bot, user, state).await
    }

    // --- Shadow buffers ---

    async fn shadow_append(
        &self,
        bot: BotId,
        user: UserId,
        item: &RelayItem,
        scheduled_flush_at: DateTime<Utc>,
    ) -> Result<i64, MirrorError> {
        queries::shadow::append(self.db()?, bot, user, item, scheduled_flush_at).await
    }

    async fn shadow_open(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<ShadowBuffer>, MirrorError> {
        queries::shadow::get_open(self.db()?, bot, user).await
    }

    async fn shadow_ack(
        &self,
        bot: BotId,
        user: UserId,
        ids: &[String],
    ) -> Result<usize, MirrorError> {
        queries::shadow::ack(self.db()?, bot, user, ids).await
    }

    async fn shadow_drop(
        &self,
        bot: BotId,
        user: UserId,
        ids: &[String],
    ) -> Result<usize, MirrorError> {
        queries::shadow::drop_items(self.db()?, bot, user, ids).await
    }

    async fn shadow_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ShadowBuffer>, MirrorError> {
        queries::shadow::due(self.db()?, now, limit).await
    }

    async fn shadow_mark_sending(
        &self,
        id: i64,
        locked_until: DateTime<Utc>,
    ) -> Result<(), MirrorError> {
        queries::shadow::mark_sending(self.db()?, id, locked_until).await
    }

    async fn shadow_prune(&self, older_than: DateTime<Utc>) -> Result<u64, MirrorError> {
        queries::shadow::prune(self.db()?, older_than).await
    }

    // --- Task queue ---

    async fn schedule_job(&self, job: &NewJob) -> Result<i64, MirrorError> {
        queries::jobs::schedule(self.db()?, job).await
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, MirrorError> {
        queries::jobs::claim_due(self.db()?, now, limit).await
    }

    async fn complete_job(&self, id: i64) -> Result<(), MirrorError> {
        queries::jobs::complete(self.db()?, id).await
    }

    async fn fail_job(
        &self,
        id: i64,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<JobStatus, MirrorError> {
        queries::jobs::fail(self.db()?, id, error, retry_at).await
    }

    async fn requeue_stale_jobs(&self, now: DateTime<Utc>) -> Result<u64, MirrorError> {
        queries::jobs::requeue_stale(self.db()?, now).await
    }
}
