// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! (bot, user) to remote discussion thread, created at most once.
//!
//! Lookups go cache, then durable store. A miss takes a short-lived cache lock
//! so only one worker creates the remote thread; the others poll the durable
//! store until the mapping shows up.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use mirrorline_cache::{TypedCache, keys};
use mirrorline_config::model::RelayConfig;
use mirrorline_core::{
    BotId, CacheStore, ControlAction, ControlButton, ControlPanel, DirectoryService, MirrorConfig,
    MirrorError, NewThread, RoutingMode, StorageAdapter, ThreadHandle, TransportClient, UserId,
};

use crate::bounded;

const LOCK_POLL: Duration = Duration::from_millis(50);

pub struct ThreadRegistry {
    storage: Arc<dyn StorageAdapter>,
    cache: Arc<dyn CacheStore>,
    transport: Arc<dyn TransportClient>,
    directory: Arc<dyn DirectoryService>,
    threads: TypedCache<ThreadHandle>,
    lock_ttl: Duration,
    lock_wait: Duration,
    transport_timeout: Duration,
}

impl ThreadRegistry {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn TransportClient>,
        directory: Arc<dyn DirectoryService>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            storage,
            threads: TypedCache::new(
                Arc::clone(&cache),
                keys::THREAD_PREFIX,
                Duration::from_secs(config.thread_cache_ttl_secs),
            ),
            cache,
            transport,
            directory,
            lock_ttl: Duration::from_secs(config.thread_lock_ttl_secs),
            lock_wait: Duration::from_millis(config.thread_lock_wait_ms),
            transport_timeout: config.transport_timeout(),
        }
    }

    /// The pair's thread, creating it (and its control panel) on first contact.
    ///
    /// Returns [`MirrorError::Contended`] when another worker holds the
    /// creation lock longer than the configured wait.
    pub async fn ensure_thread(
        &self,
        bot: BotId,
        user: UserId,
        config: &MirrorConfig,
    ) -> Result<ThreadHandle, MirrorError> {
        if let Some(handle) = self.threads.get(&keys::pair(bot, user)).await {
            return Ok(handle);
        }
        if let Some(handle) = self.load_durable(bot, user).await? {
            return Ok(handle);
        }

        let lock_key = keys::thread_lock(bot, user);
        if !self.cache.set_nx(&lock_key, "1".into(), self.lock_ttl).await? {
            debug!(bot_id = %bot, user_id = %user, "thread creation in progress elsewhere, waiting");
            return self.wait_for_mapping(bot, user, lock_key).await;
        }

        let created = self.create_locked(bot, user, config).await;
        if let Err(e) = self.cache.delete(&lock_key).await {
            warn!(key = %lock_key, error = %e, "failed to release thread lock");
        }
        created
    }

    /// Look up a mapping by its durable record ID (control-panel callbacks).
    pub async fn lookup(&self, record_id: i64) -> Result<Option<ThreadHandle>, MirrorError> {
        self.storage.get_thread_by_record(record_id).await
    }

    /// Remove a mapping whose remote thread is gone so the next flush recreates it.
    pub async fn forget(&self, handle: &ThreadHandle) -> Result<(), MirrorError> {
        self.storage.delete_thread(handle.record_id).await?;
        if let Err(e) = self
            .threads
            .invalidate(&keys::pair(handle.bot_id, handle.user_id))
            .await
        {
            warn!(record_id = handle.record_id, error = %e, "thread cache invalidation failed");
        }
        info!(
            bot_id = %handle.bot_id,
            user_id = %handle.user_id,
            thread_id = %handle.thread_id,
            "forgot thread mapping"
        );
        Ok(())
    }

    async fn load_durable(
        &self,
        bot: BotId,
        user: UserId,
    ) -> Result<Option<ThreadHandle>, MirrorError> {
        let handle = self.storage.get_thread(bot, user).await?;
        if let Some(handle) = &handle {
            self.cache_handle(handle).await;
        }
        Ok(handle)
    }

    async fn cache_handle(&self, handle: &ThreadHandle) {
        if let Err(e) = self
            .threads
            .put(&keys::pair(handle.bot_id, handle.user_id), handle)
            .await
        {
            warn!(record_id = handle.record_id, error = %e, "thread cache populate failed");
        }
    }

    async fn wait_for_mapping(
        &self,
        bot: BotId,
        user: UserId,
        lock_key: String,
    ) -> Result<ThreadHandle, MirrorError> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            tokio::time::sleep(LOCK_POLL).await;
            if let Some(handle) = self.load_durable(bot, user).await? {
                return Ok(handle);
            }
            if Instant::now() >= deadline {
                return Err(MirrorError::Contended { key: lock_key });
            }
        }
    }

    async fn create_locked(
        &self,
        bot: BotId,
        user: UserId,
        config: &MirrorConfig,
    ) -> Result<ThreadHandle, MirrorError> {
        // The previous holder may have finished between our miss and the lock.
        if let Some(handle) = self.load_durable(bot, user).await? {
            return Ok(handle);
        }

        let name = self.thread_name(bot, user, config).await;
        let thread_id = bounded(
            self.transport_timeout,
            self.transport
                .create_thread(bot, &config.destination, &name),
        )
        .await?;

        let mut handle = self
            .storage
            .insert_thread(&NewThread {
                bot_id: bot,
                user_id: user,
                destination: config.destination.clone(),
                thread_id: thread_id.clone(),
            })
            .await?;

        if handle.thread_id != thread_id {
            warn!(
                bot_id = %bot,
                user_id = %user,
                orphan = %thread_id,
                "thread mapping already existed, keeping the stored one"
            );
        } else {
            mirrorline_prometheus::record_thread_created();
            info!(
                bot_id = %bot,
                user_id = %user,
                thread_id = %thread_id,
                record_id = handle.record_id,
                "created review thread"
            );
            self.install_control_panel(&mut handle).await;
        }

        self.cache_handle(&handle).await;
        Ok(handle)
    }

    /// Post, pin, and persist the control panel. Failures only warn.
    async fn install_control_panel(&self, handle: &mut ThreadHandle) {
        let panel = control_panel(handle.record_id, handle.user_id);
        let posted = bounded(
            self.transport_timeout,
            self.transport.post_message(
                handle.bot_id,
                &handle.destination,
                &handle.thread_id,
                &panel.text,
                Some(&panel),
            ),
        )
        .await;
        let message_id = match posted {
            Ok(id) => id,
            Err(e) => {
                warn!(record_id = handle.record_id, error = %e, "control panel post failed");
                return;
            }
        };

        if let Err(e) = bounded(
            self.transport_timeout,
            self.transport
                .pin_message(handle.bot_id, &handle.destination, &message_id),
        )
        .await
        {
            warn!(record_id = handle.record_id, error = %e, "control panel pin failed");
        }
        if let Err(e) = self
            .storage
            .set_control_message(handle.record_id, &message_id)
            .await
        {
            warn!(record_id = handle.record_id, error = %e, "control panel id not persisted");
        }
        handle.control_message_id = Some(message_id);
    }

    async fn thread_name(&self, bot: BotId, user: UserId, config: &MirrorConfig) -> String {
        let display = self
            .directory
            .user_display_name(bot, user)
            .await
            .unwrap_or_else(|| format!("User {user}"));
        match config.routing_mode {
            RoutingMode::Individual => display,
            RoutingMode::Centralized => match self.directory.bot_handle(bot).await {
                Some(handle) => format!("@{} · {display}", handle.trim_start_matches('@')),
                None => format!("Bot {bot} · {display}"),
            },
        }
    }
}

/// Operator controls pinned at the top of every review thread.
pub fn control_panel(record_id: i64, user: UserId) -> ControlPanel {
    let button = |label: &str, action: ControlAction| ControlButton {
        label: label.to_string(),
        token: action.token(record_id),
    };
    ControlPanel {
        text: format!("🛠 Controls for user {user}"),
        buttons: vec![
            vec![
                button("🚫 Ban", ControlAction::Ban),
                button("✅ Unban", ControlAction::Unban),
            ],
            vec![button("🔄 Reset conversation", ControlAction::Reset)],
            vec![
                button("⏸ Pause AI", ControlAction::PauseAi),
                button("▶️ Resume AI", ControlAction::ResumeAi),
            ],
        ],
    }
}
