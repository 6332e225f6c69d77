// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock directory service and conversation engine.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mirrorline_core::{BotId, ConversationEngine, DirectoryService, MirrorError, UserId};

/// Directory with names registered by the test.
#[derive(Default)]
pub struct MockDirectory {
    users: Mutex<HashMap<(BotId, UserId), String>>,
    bots: Mutex<HashMap<BotId, String>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, bot: BotId, user: UserId, name: &str) {
        self.users.lock().await.insert((bot, user), name.to_string());
    }

    pub async fn add_bot(&self, bot: BotId, handle: &str) {
        self.bots.lock().await.insert(bot, handle.to_string());
    }
}

#[async_trait]
impl DirectoryService for MockDirectory {
    async fn user_display_name(&self, bot: BotId, user: UserId) -> Option<String> {
        self.users.lock().await.get(&(bot, user)).cloned()
    }

    async fn bot_handle(&self, bot: BotId) -> Option<String> {
        self.bots.lock().await.get(&bot).cloned()
    }
}

/// Engine that records reset requests.
#[derive(Default)]
pub struct MockEngine {
    resets: Mutex<Vec<(BotId, UserId)>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resets(&self) -> Vec<(BotId, UserId)> {
        self.resets.lock().await.clone()
    }
}

#[async_trait]
impl ConversationEngine for MockEngine {
    async fn reset_conversation(&self, bot: BotId, user: UserId) -> Result<(), MirrorError> {
        self.resets.lock().await.push((bot, user));
        Ok(())
    }
}
