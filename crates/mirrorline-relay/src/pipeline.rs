// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion entry point. Never fails the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use mirrorline_core::{BotId, RelayItem, Role, UserId};
use mirrorline_prometheus as metrics;

use crate::resolver::DestinationResolver;
use crate::scheduler::{BatchScheduler, Scheduled};
use crate::user_state::UserStateStore;

/// One message seen by a client bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorRequest {
    pub bot_id: BotId,
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    /// When the message was sent; defaults to arrival time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// What the pipeline did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorDisposition {
    /// Waiting in the buffer for a deferred flush.
    Buffered,
    /// Buffered and an immediate flush is scheduled.
    FlushScheduled,
    /// The bot has no active mirror configuration.
    NotConfigured,
    /// The user is banned from mirroring.
    Banned,
    /// Empty content.
    Ignored,
    /// Buffering or scheduling failed; the error was logged.
    Failed,
}

impl MirrorDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buffered => "buffered",
            Self::FlushScheduled => "flush_scheduled",
            Self::NotConfigured => "not_configured",
            Self::Banned => "banned",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
        }
    }
}

pub struct MirrorPipeline {
    resolver: Arc<DestinationResolver>,
    user_states: Arc<UserStateStore>,
    scheduler: Arc<BatchScheduler>,
}

impl MirrorPipeline {
    pub fn new(
        resolver: Arc<DestinationResolver>,
        user_states: Arc<UserStateStore>,
        scheduler: Arc<BatchScheduler>,
    ) -> Self {
        Self {
            resolver,
            user_states,
            scheduler,
        }
    }

    pub async fn mirror_message(&self, request: MirrorRequest) -> MirrorDisposition {
        let disposition = self.dispatch(request).await;
        metrics::record_message(disposition.as_str());
        disposition
    }

    async fn dispatch(&self, request: MirrorRequest) -> MirrorDisposition {
        let MirrorRequest {
            bot_id: bot,
            user_id: user,
            role,
            content,
            timestamp,
        } = request;

        if content.trim().is_empty() {
            return MirrorDisposition::Ignored;
        }
        let Some(config) = self.resolver.resolve(bot).await else {
            return MirrorDisposition::NotConfigured;
        };
        if self.user_states.get(bot, user).await.is_banned {
            debug!(bot_id = %bot, user_id = %user, "user banned, not mirroring");
            return MirrorDisposition::Banned;
        }

        let item = RelayItem::new(role, content, timestamp.unwrap_or_else(Utc::now));
        match self.scheduler.submit(bot, user, &item, &config).await {
            Ok(Scheduled::Immediate) => MirrorDisposition::FlushScheduled,
            Ok(Scheduled::Deferred { .. }) => MirrorDisposition::Buffered,
            Err(e) => {
                error!(bot_id = %bot, user_id = %user, error = %e, "failed to buffer message");
                MirrorDisposition::Failed
            }
        }
    }
}
