// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-crate fakes for the relay's unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::Mutex;

use mirrorline_cache::MemoryCache;
use mirrorline_config::model::{RelayConfig, StorageConfig};
use mirrorline_core::{
    AdapterType, BotId, CacheStore, ControlPanel, ConversationEngine, DestinationId,
    DirectoryService, HealthStatus, Job, JobStatus, MessageId, MirrorConfig, MirrorError, NewJob,
    NewThread, PluginAdapter, RelayItem, ShadowBuffer, StorageAdapter, ThreadHandle, ThreadId,
    TransportClient, TransportErrorKind, UserId, UserMirrorState,
};
use mirrorline_storage::SqliteStorage;

use crate::{Relay, RelayDeps};

#[derive(Debug, Clone)]
pub struct Post {
    pub destination: DestinationId,
    pub thread: ThreadId,
    pub text: String,
    pub has_panel: bool,
}

/// Transport that records every call and fails on demand.
#[derive(Default)]
pub struct RecordingTransport {
    pub threads: Mutex<Vec<String>>,
    pub posts: Mutex<Vec<Post>>,
    pub pins: Mutex<Vec<MessageId>>,
    pub post_failures: Mutex<VecDeque<TransportErrorKind>>,
    /// Relayed posts that succeed before `post_failures` apply.
    pub posts_before_failure: AtomicUsize,
    pub create_delay: Mutex<Duration>,
    pub max_len: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingTransport {
    /// Posts without a control panel, i.e. relayed batches.
    pub async fn batches(&self) -> Vec<String> {
        self.posts
            .lock()
            .await
            .iter()
            .filter(|p| !p.has_panel)
            .map(|p| p.text.clone())
            .collect()
    }

    pub async fn fail_next_posts(&self, kinds: impl IntoIterator<Item = TransportErrorKind>) {
        self.post_failures.lock().await.extend(kinds);
    }

    /// Let `successes` relayed posts through, then fail with `kind`.
    pub async fn fail_after_posts(&self, successes: usize, kind: TransportErrorKind) {
        self.posts_before_failure.store(successes, Ordering::SeqCst);
        self.post_failures.lock().await.push_back(kind);
    }
}

#[async_trait]
impl PluginAdapter for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorError> {
        Ok(())
    }
}

#[async_trait]
impl TransportClient for RecordingTransport {
    fn max_message_length(&self) -> usize {
        match self.max_len.load(Ordering::SeqCst) {
            0 => 4096,
            n => n,
        }
    }

    async fn create_thread(
        &self,
        _bot: BotId,
        _destination: &DestinationId,
        name: &str,
    ) -> Result<ThreadId, MirrorError> {
        let delay = *self.create_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut threads = self.threads.lock().await;
        threads.push(name.to_string());
        Ok(ThreadId(format!("topic-{}", threads.len())))
    }

    async fn post_message(
        &self,
        _bot: BotId,
        destination: &DestinationId,
        thread: &ThreadId,
        text: &str,
        panel: Option<&ControlPanel>,
    ) -> Result<MessageId, MirrorError> {
        let passes = panel.is_some()
            || self
                .posts_before_failure
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if !passes && let Some(kind) = self.post_failures.lock().await.pop_front() {
            return Err(MirrorError::transport(kind, "injected failure"));
        }
        self.posts.lock().await.push(Post {
            destination: destination.clone(),
            thread: thread.clone(),
            text: text.to_string(),
            has_panel: panel.is_some(),
        });
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageId(id.to_string()))
    }

    async fn pin_message(
        &self,
        _bot: BotId,
        _destination: &DestinationId,
        message: &MessageId,
    ) -> Result<(), MirrorError> {
        self.pins.lock().await.push(message.clone());
        Ok(())
    }
}

pub struct StaticDirectory;

#[async_trait]
impl DirectoryService for StaticDirectory {
    async fn user_display_name(&self, _bot: BotId, user: UserId) -> Option<String> {
        (user.0 == 42).then(|| "Bob".to_string())
    }

    async fn bot_handle(&self, _bot: BotId) -> Option<String> {
        Some("support_bot".to_string())
    }
}

#[derive(Default)]
pub struct CountingEngine {
    pub resets: AtomicUsize,
}

#[async_trait]
impl ConversationEngine for CountingEngine {
    async fn reset_conversation(&self, _bot: BotId, _user: UserId) -> Result<(), MirrorError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Durable store that fails reads or writes on demand. The job queue is
/// never failed.
pub struct FlakyStorage {
    inner: Arc<SqliteStorage>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStorage {
    fn new(inner: Arc<SqliteStorage>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn read(&self) -> Result<(), MirrorError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MirrorError::Storage {
                source: Box::new(std::io::Error::other("injected read failure")),
            });
        }
        Ok(())
    }

    fn write(&self) -> Result<(), MirrorError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MirrorError::Storage {
                source: Box::new(std::io::Error::other("injected write failure")),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for FlakyStorage {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), MirrorError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl StorageAdapter for FlakyStorage {
    async fn initialize(&self) -> Result<(), MirrorError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), MirrorError> {
        self.inner.close().await
    }

    async fn get_mirror_config(&self, bot: BotId) -> Result<Option<MirrorConfig>, MirrorError> {
        self.read()?;
        self.inner.get_mirror_config(bot).await
    }

    async fn upsert_mirror_config(&self, config: &MirrorConfig) -> Result<(), MirrorError> {
        self.write()?;
        self.inner.upsert_mirror_config(config).await
    }

    async fn list_mirror_configs(&self) -> Result<Vec<MirrorConfig>, MirrorError> {
        self.read()?;
        self.inner.list_mirror_configs().await
    }

    async fn get_thread(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<ThreadHandle>, MirrorError> {
        self.read()?;
        self.inner.get_thread(bot, user).await
    }

    async fn get_thread_by_record(
        &self,
        record_id: i64,
    ) -> Result<Option<ThreadHandle>, MirrorError> {
        self.read()?;
        self.inner.get_thread_by_record(record_id).await
    }

    async fn insert_thread(&self, thread: &NewThread) -> Result<ThreadHandle, MirrorError> {
        self.write()?;
        self.inner.insert_thread(thread).await
    }

    async fn set_control_message(
        &self,
        record_id: i64,
        message_id: &MessageId,
    ) -> Result<(), MirrorError> {
        self.write()?;
        self.inner.set_control_message(record_id, message_id).await
    }

    async fn record_flush(
        &self,
        record_id: i64,
        delivered: i64,
        at: DateTime<Utc>,
    ) -> Result<(), MirrorError> {
        self.write()?;
        self.inner.record_flush(record_id, delivered, at).await
    }

    async fn delete_thread(&self, record_id: i64) -> Result<(), MirrorError> {
        self.write()?;
        self.inner.delete_thread(record_id).await
    }

    async fn get_user_state(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<UserMirrorState>, MirrorError> {
        self.read()?;
        self.inner.get_user_state(bot, user).await
    }

    async fn upsert_user_state(
        &self,
        bot: BotId,
        user: UserId,
        state: UserMirrorState,
    ) -> Result<(), MirrorError> {
        self.write()?;
        self.inner.upsert_user_state(bot, user, state).await
    }

    async fn shadow_append(
        &self,
        bot: BotId,
        user: UserId,
        item: &RelayItem,
        scheduled_flush_at: DateTime<Utc>,
    ) -> Result<i64, MirrorError> {
        self.write()?;
        self.inner.shadow_append(bot, user, item, scheduled_flush_at).await
    }

    async fn shadow_open(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<ShadowBuffer>, MirrorError> {
        self.read()?;
        self.inner.shadow_open(bot, user).await
    }

    async fn shadow_ack(
        &self,
        bot: BotId,
        user: UserId,
        ids: &[String],
    ) -> Result<usize, MirrorError> {
        self.write()?;
        self.inner.shadow_ack(bot, user, ids).await
    }

    async fn shadow_drop(
        &self,
        bot: BotId,
        user: UserId,
        ids: &[String],
    ) -> Result<usize, MirrorError> {
        self.write()?;
        self.inner.shadow_drop(bot, user, ids).await
    }

    async fn shadow_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ShadowBuffer>, MirrorError> {
        self.read()?;
        self.inner.shadow_due(now, limit).await
    }

    async fn shadow_mark_sending(
        &self,
        id: i64,
        locked_until: DateTime<Utc>,
    ) -> Result<(), MirrorError> {
        self.write()?;
        self.inner.shadow_mark_sending(id, locked_until).await
    }

    async fn shadow_prune(&self, older_than: DateTime<Utc>) -> Result<u64, MirrorError> {
        self.write()?;
        self.inner.shadow_prune(older_than).await
    }

    async fn schedule_job(&self, job: &NewJob) -> Result<i64, MirrorError> {
        self.inner.schedule_job(job).await
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, MirrorError> {
        self.inner.claim_due_jobs(now, limit).await
    }

    async fn complete_job(&self, id: i64) -> Result<(), MirrorError> {
        self.inner.complete_job(id).await
    }

    async fn fail_job(
        &self,
        id: i64,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<JobStatus, MirrorError> {
        self.inner.fail_job(id, error, retry_at).await
    }

    async fn requeue_stale_jobs(&self, now: DateTime<Utc>) -> Result<u64, MirrorError> {
        self.inner.requeue_stale_jobs(now).await
    }
}

pub fn test_relay_config() -> RelayConfig {
    RelayConfig {
        post_flush_delay_ms: 0,
        poll_interval_ms: 10,
        thread_lock_wait_ms: 2_000,
        ..RelayConfig::default()
    }
}

pub struct Fixture {
    pub relay: Relay,
    /// The store behind `faults`, for assertions that bypass injected failures.
    pub storage: Arc<SqliteStorage>,
    /// What the relay talks to.
    pub faults: Arc<FlakyStorage>,
    pub cache: Arc<MemoryCache>,
    pub transport: Arc<RecordingTransport>,
    pub engine: Arc<CountingEngine>,
    _dir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(test_relay_config()).await
    }

    pub async fn with_config(config: RelayConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("relay.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();
        let faults = Arc::new(FlakyStorage::new(Arc::clone(&storage)));

        let cache = Arc::new(MemoryCache::new());
        let transport = Arc::new(RecordingTransport::default());
        let engine = Arc::new(CountingEngine::default());

        let relay = Relay::new(
            config,
            RelayDeps {
                storage: Arc::clone(&faults) as Arc<dyn StorageAdapter>,
                cache: Arc::clone(&cache) as Arc<dyn CacheStore>,
                transport: Arc::clone(&transport) as Arc<dyn TransportClient>,
                directory: Arc::new(StaticDirectory),
                engine: Arc::clone(&engine) as Arc<dyn ConversationEngine>,
            },
        );

        Self {
            relay,
            storage,
            faults,
            cache,
            transport,
            engine,
            _dir: dir,
        }
    }

    /// Store an active config for `bot` with the given batch size.
    pub async fn configure(&self, bot: BotId, batch_size: u32) -> MirrorConfig {
        let config = MirrorConfig {
            batch_size,
            ..MirrorConfig::new(bot, DestinationId("-100500".into()))
        };
        self.relay.resolver.store(&config).await.unwrap();
        config
    }
}
