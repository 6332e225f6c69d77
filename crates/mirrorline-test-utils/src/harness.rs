// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete relay with mock adapters, the in-process
//! cache, and a temp SQLite database. Jobs are not run in the background;
//! tests drive them with [`TestHarness::run_jobs`] or
//! [`TestHarness::run_jobs_at`] so every step is deterministic.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use mirrorline_cache::MemoryCache;
use mirrorline_config::model::{RelayConfig, StorageConfig};
use mirrorline_core::{
    BotId, CacheStore, ConversationEngine, DestinationId, DirectoryService, MirrorConfig,
    MirrorError, Role, StorageAdapter, TransportClient, UserId,
};
use mirrorline_relay::{MirrorDisposition, MirrorRequest, Relay, RelayDeps};
use mirrorline_storage::SqliteStorage;

use crate::mock_collaborators::{MockDirectory, MockEngine};
use crate::mock_transport::MockTransport;

/// Upper bound on job rounds per drive call, so a job that keeps
/// rescheduling itself cannot hang a test.
const MAX_ROUNDS: usize = 1000;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    relay: RelayConfig,
    max_message_length: usize,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            relay: RelayConfig {
                post_flush_delay_ms: 0,
                poll_interval_ms: 10,
                ..RelayConfig::default()
            },
            max_message_length: 4096,
        }
    }

    /// Adjust the relay tunables.
    pub fn with_relay(mut self, tweak: impl FnOnce(&mut RelayConfig)) -> Self {
        tweak(&mut self.relay);
        self
    }

    /// Set the mock transport's message size limit.
    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, MirrorError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| MirrorError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await?;

        let cache = Arc::new(MemoryCache::new());
        let transport = Arc::new(MockTransport::with_max_message_length(
            self.max_message_length,
        ));
        let directory = Arc::new(MockDirectory::new());
        let engine = Arc::new(MockEngine::new());

        let relay = Relay::new(
            self.relay,
            RelayDeps {
                storage: Arc::clone(&storage) as Arc<dyn StorageAdapter>,
                cache: Arc::clone(&cache) as Arc<dyn CacheStore>,
                transport: Arc::clone(&transport) as Arc<dyn TransportClient>,
                directory: Arc::clone(&directory) as Arc<dyn DirectoryService>,
                engine: Arc::clone(&engine) as Arc<dyn ConversationEngine>,
            },
        );

        Ok(TestHarness {
            relay,
            storage,
            cache,
            transport,
            directory,
            engine,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete relay with mock adapters and temp storage.
pub struct TestHarness {
    pub relay: Relay,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    pub cache: Arc<MemoryCache>,
    pub transport: Arc<MockTransport>,
    pub directory: Arc<MockDirectory>,
    pub engine: Arc<MockEngine>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Store an active mirror config for `bot` with `batch_size`.
    pub async fn configure(&self, bot: BotId, batch_size: u32) -> Result<MirrorConfig, MirrorError> {
        let config = MirrorConfig {
            batch_size,
            ..MirrorConfig::new(bot, DestinationId("-1001234567890".into()))
        };
        self.relay.resolver.store(&config).await?;
        Ok(config)
    }

    /// Feed one user message through the ingestion pipeline.
    pub async fn send(&self, bot: BotId, user: UserId, text: &str) -> MirrorDisposition {
        self.send_as(bot, user, Role::User, text).await
    }

    pub async fn send_as(
        &self,
        bot: BotId,
        user: UserId,
        role: Role,
        text: &str,
    ) -> MirrorDisposition {
        self.relay
            .pipeline
            .mirror_message(MirrorRequest {
                bot_id: bot,
                user_id: user,
                role,
                content: text.to_string(),
                timestamp: None,
            })
            .await
    }

    /// Run jobs due now until none are left. Returns how many ran.
    pub async fn run_jobs(&self) -> Result<usize, MirrorError> {
        self.drive(Utc::now).await
    }

    /// Run jobs as if the clock read `at`, until none are left.
    pub async fn run_jobs_at(&self, at: DateTime<Utc>) -> Result<usize, MirrorError> {
        self.drive(|| at).await
    }

    async fn drive(&self, clock: impl Fn() -> DateTime<Utc>) -> Result<usize, MirrorError> {
        let mut total = 0;
        for _ in 0..MAX_ROUNDS {
            let ran = self.relay.worker.run_due(clock()).await?;
            if ran == 0 {
                break;
            }
            total += ran;
        }
        Ok(total)
    }
}
