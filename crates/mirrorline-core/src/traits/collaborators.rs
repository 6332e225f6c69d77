// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces of the external systems the relay talks to.

use async_trait::async_trait;

use crate::error::MirrorError;
use crate::types::{BotId, UserId};

/// Resolves a usable API token for a bot.
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    async fn token(&self, bot: BotId) -> Result<Option<String>, MirrorError>;
}

/// Identity records of users and bots.
#[async_trait]
pub trait DirectoryService: Send + Sync + 'static {
    async fn user_display_name(&self, bot: BotId, user: UserId) -> Option<String>;

    /// Public handle of the bot, without the leading `@`.
    async fn bot_handle(&self, bot: BotId) -> Option<String>;
}

/// The conversation engine that produces the bot side of the chat.
#[async_trait]
pub trait ConversationEngine: Send + Sync + 'static {
    /// Clears history and conversation phase for the user.
    async fn reset_conversation(&self, bot: BotId, user: UserId) -> Result<(), MirrorError>;
}
