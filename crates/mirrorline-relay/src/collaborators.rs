// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in directory and conversation-engine implementations.
//!
//! A deployment without a user directory gets fallback thread names from
//! [`NullDirectory`]; [`MemoryDirectory`] is fed by the ingest API. The real
//! conversation engine lives outside the relay, so [`LoggingEngine`] only
//! records reset requests.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use mirrorline_core::{BotId, ConversationEngine, DirectoryService, MirrorError, UserId};

/// Knows no names; thread titles fall back to user IDs.
pub struct NullDirectory;

#[async_trait]
impl DirectoryService for NullDirectory {
    async fn user_display_name(&self, _bot: BotId, _user: UserId) -> Option<String> {
        None
    }

    async fn bot_handle(&self, _bot: BotId) -> Option<String> {
        None
    }
}

/// Names registered at runtime.
#[derive(Default)]
pub struct MemoryDirectory {
    users: DashMap<(BotId, UserId), String>,
    bots: DashMap<BotId, String>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user(&self, bot: BotId, user: UserId, display_name: impl Into<String>) {
        self.users.insert((bot, user), display_name.into());
    }

    pub fn set_bot(&self, bot: BotId, handle: impl Into<String>) {
        self.bots.insert(bot, handle.into());
    }
}

#[async_trait]
impl DirectoryService for MemoryDirectory {
    async fn user_display_name(&self, bot: BotId, user: UserId) -> Option<String> {
        self.users.get(&(bot, user)).map(|name| name.clone())
    }

    async fn bot_handle(&self, bot: BotId) -> Option<String> {
        self.bots.get(&bot).map(|handle| handle.clone())
    }
}

pub struct LoggingEngine;

#[async_trait]
impl ConversationEngine for LoggingEngine {
    async fn reset_conversation(&self, bot: BotId, user: UserId) -> Result<(), MirrorError> {
        info!(bot_id = %bot, user_id = %user, "conversation reset requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_directory_returns_registered_names() {
        let directory = MemoryDirectory::new();
        directory.set_user(BotId(1), UserId(2), "Alice");
        directory.set_bot(BotId(1), "helper_bot");

        assert_eq!(
            directory.user_display_name(BotId(1), UserId(2)).await.as_deref(),
            Some("Alice")
        );
        assert_eq!(directory.user_display_name(BotId(1), UserId(3)).await, None);
        assert_eq!(directory.bot_handle(BotId(1)).await.as_deref(), Some("helper_bot"));
        assert_eq!(NullDirectory.bot_handle(BotId(1)).await, None);
    }
}
