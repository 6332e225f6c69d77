// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(bot, user) ban and pause flags.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use mirrorline_cache::{TypedCache, keys};
use mirrorline_core::{BotId, CacheStore, MirrorError, StorageAdapter, UserId, UserMirrorState};

pub struct UserStateStore {
    storage: Arc<dyn StorageAdapter>,
    states: TypedCache<UserMirrorState>,
}

impl UserStateStore {
    pub fn new(storage: Arc<dyn StorageAdapter>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            storage,
            states: TypedCache::new(cache, keys::USER_STATE_PREFIX, ttl),
        }
    }

    /// Current flags; store failures read as the default (not banned, not paused).
    pub async fn get(&self, bot: BotId, user: UserId) -> UserMirrorState {
        let storage = Arc::clone(&self.storage);
        let loaded = self
            .states
            .get_or_load(&keys::pair(bot, user), || async move {
                storage.get_user_state(bot, user).await
            })
            .await;

        match loaded {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!(bot_id = %bot, user_id = %user, error = %e, "user state lookup failed");
                UserMirrorState::default()
            }
        }
    }

    /// Read the durable flags, apply `change`, persist, then refresh the cache.
    ///
    /// Persisting is the source of truth and its failure is returned. A cache
    /// write failure evicts the entry instead.
    pub async fn update<F>(
        &self,
        bot: BotId,
        user: UserId,
        change: F,
    ) -> Result<UserMirrorState, MirrorError>
    where
        F: FnOnce(&mut UserMirrorState) + Send,
    {
        let mut state = self
            .storage
            .get_user_state(bot, user)
            .await?
            .unwrap_or_default();
        change(&mut state);
        self.storage.upsert_user_state(bot, user, state).await?;

        let id = keys::pair(bot, user);
        if let Err(e) = self.states.put(&id, &state).await {
            warn!(bot_id = %bot, user_id = %user, error = %e, "user state cache refresh failed");
            let _ = self.states.invalidate(&id).await;
        }
        Ok(state)
    }
}
