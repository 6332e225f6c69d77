// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator actions from a thread's pinned control panel.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use mirrorline_core::{BotId, ControlAction, ConversationEngine, UserId};

use crate::registry::ThreadRegistry;
use crate::user_state::UserStateStore;

/// Result of handling a callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Applied {
        action: ControlAction,
        bot_id: BotId,
        user_id: UserId,
        /// Confirmation shown to the operator.
        text: String,
    },
    /// Unknown action, malformed token, or no such thread record.
    Unrecognized,
}

pub struct ControlHandler {
    user_states: Arc<UserStateStore>,
    registry: Arc<ThreadRegistry>,
    engine: Arc<dyn ConversationEngine>,
}

impl ControlHandler {
    pub fn new(
        user_states: Arc<UserStateStore>,
        registry: Arc<ThreadRegistry>,
        engine: Arc<dyn ConversationEngine>,
    ) -> Self {
        Self {
            user_states,
            registry,
            engine,
        }
    }

    /// Apply `action` and return a confirmation naming the user.
    ///
    /// Idempotent: repeating an action yields the same state and message.
    pub async fn apply_action(&self, action: ControlAction, bot: BotId, user: UserId) -> String {
        let applied = match action {
            ControlAction::Ban => self
                .user_states
                .update(bot, user, |s| s.is_banned = true)
                .await
                .map(|_| format!("🚫 User {user} is banned. Their messages are no longer mirrored.")),
            ControlAction::Unban => self
                .user_states
                .update(bot, user, |s| s.is_banned = false)
                .await
                .map(|_| format!("✅ User {user} is unbanned. Mirroring resumed.")),
            ControlAction::Reset => self
                .engine
                .reset_conversation(bot, user)
                .await
                .map(|()| format!("🔄 Conversation with user {user} was reset.")),
            ControlAction::PauseAi => self
                .user_states
                .update(bot, user, |s| s.is_ai_paused = true)
                .await
                .map(|_| format!("⏸ AI replies paused for user {user}.")),
            ControlAction::ResumeAi => self
                .user_states
                .update(bot, user, |s| s.is_ai_paused = false)
                .await
                .map(|_| format!("▶️ AI replies resumed for user {user}.")),
        };

        match applied {
            Ok(text) => {
                info!(bot_id = %bot, user_id = %user, %action, "control action applied");
                text
            }
            Err(e) => {
                warn!(bot_id = %bot, user_id = %user, %action, error = %e, "control action failed");
                format!("⚠️ Could not {} user {user}. Please try again.", verb(action))
            }
        }
    }

    /// Parse an `{action}_{record_id}` token and apply it to the thread's user.
    pub async fn handle_callback(&self, token: &str) -> CallbackOutcome {
        let Some((action, record)) = token.rsplit_once('_') else {
            return CallbackOutcome::Unrecognized;
        };
        let (Ok(action), Ok(record_id)) = (ControlAction::from_str(action), record.parse::<i64>())
        else {
            return CallbackOutcome::Unrecognized;
        };

        let handle = match self.registry.lookup(record_id).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return CallbackOutcome::Unrecognized,
            Err(e) => {
                warn!(record_id, error = %e, "thread lookup for callback failed");
                return CallbackOutcome::Unrecognized;
            }
        };

        let text = self
            .apply_action(action, handle.bot_id, handle.user_id)
            .await;
        CallbackOutcome::Applied {
            action,
            bot_id: handle.bot_id,
            user_id: handle.user_id,
            text,
        }
    }
}

fn verb(action: ControlAction) -> &'static str {
    match action {
        ControlAction::Ban => "ban",
        ControlAction::Unban => "unban",
        ControlAction::Reset => "reset the conversation of",
        ControlAction::PauseAi => "pause AI replies for",
        ControlAction::ResumeAi => "resume AI replies for",
    }
}
