// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store trait: the authoritative copy of everything the cache fronts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MirrorError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    BotId, Job, JobStatus, MessageId, MirrorConfig, NewJob, NewThread, RelayItem, ShadowBuffer,
    ThreadHandle, UserId, UserMirrorState,
};

/// Adapter for the durable store.
///
/// Holds mirror configurations, thread mappings, user flags, the durable
/// shadow of pending buffers, and the task queue.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), MirrorError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), MirrorError>;

    // --- Mirror configuration (Configuration Store) ---

    async fn get_mirror_config(&self, bot: BotId) -> Result<Option<MirrorConfig>, MirrorError>;

    async fn upsert_mirror_config(&self, config: &MirrorConfig) -> Result<(), MirrorError>;

    async fn list_mirror_configs(&self) -> Result<Vec<MirrorConfig>, MirrorError>;

    // --- Thread mappings ---

    async fn get_thread(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<ThreadHandle>, MirrorError>;

    async fn get_thread_by_record(&self, record_id: i64)
    -> Result<Option<ThreadHandle>, MirrorError>;

    /// Inserts a mapping. If one already exists for the pair, the existing
    /// mapping is returned unchanged.
    async fn insert_thread(&self, thread: &NewThread) -> Result<ThreadHandle, MirrorError>;

    async fn set_control_message(
        &self,
        record_id: i64,
        message_id: &MessageId,
    ) -> Result<(), MirrorError>;

    /// Adds `delivered` to the relayed counter and stamps the flush time.
    async fn record_flush(
        &self,
        record_id: i64,
        delivered: i64,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorError>;

    async fn delete_thread(&self, record_id: i64) -> Result<(), MirrorError>;

    // --- User state ---

    async fn get_user_state(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<UserMirrorState>, MirrorError>;

    async fn upsert_user_state(
        &self,
        bot: BotId,
        user: UserId,
        state: UserMirrorState,
    ) -> Result<(), MirrorError>;

    // --- Durable shadow buffers ---

    /// Appends an item to the open (pending or sending) shadow record of the
    /// pair, creating a `pending` record on the first item. Moves the
    /// scheduled flush time. Returns the record ID.
    async fn shadow_append(
        &self,
        bot: BotId,
        user: UserId,
        item: &RelayItem,
        scheduled_flush_at: DateTime<Utc>,
    ) -> Result<i64, MirrorError>;

    /// Returns the open shadow record of the pair, if any.
    async fn shadow_open(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<ShadowBuffer>, MirrorError>;

    /// Removes the items with the given IDs from the open record and clears
    /// its sending lock. The record becomes `sent` once it is empty. Returns
    /// the number of items removed; an empty `ids` only releases the lock.
    async fn shadow_ack(
        &self,
        bot: BotId,
        user: UserId,
        ids: &[String],
    ) -> Result<usize, MirrorError>;

    /// Like [`shadow_ack`](Self::shadow_ack) but the record ends as `dropped`.
    async fn shadow_drop(
        &self,
        bot: BotId,
        user: UserId,
        ids: &[String],
    ) -> Result<usize, MirrorError>;

    /// Open records whose flush is overdue: `pending` with
    /// `scheduled_flush_at <= now`, or `sending` with an expired lock.
    async fn shadow_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ShadowBuffer>, MirrorError>;

    async fn shadow_mark_sending(
        &self,
        id: i64,
        locked_until: DateTime<Utc>,
    ) -> Result<(), MirrorError>;

    /// Deletes closed records last updated before `older_than`.
    async fn shadow_prune(&self, older_than: DateTime<Utc>) -> Result<u64, MirrorError>;

    // --- Task queue ---

    /// Schedules a job. With a dedupe key, an existing pending job is moved
    /// to the new due time instead of stacking a second one.
    async fn schedule_job(&self, job: &NewJob) -> Result<i64, MirrorError>;

    /// Claims up to `limit` due jobs, marking them `processing` with a lock.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, MirrorError>;

    async fn complete_job(&self, id: i64) -> Result<(), MirrorError>;

    /// Records a failed attempt; the job returns to `pending` at `retry_at`
    /// until its attempts are exhausted. Returns the resulting status.
    async fn fail_job(
        &self,
        id: i64,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<JobStatus, MirrorError>;

    /// Returns `processing` jobs whose lock expired to `pending`.
    async fn requeue_stale_jobs(&self, now: DateTime<Utc>) -> Result<u64, MirrorError>;
}
