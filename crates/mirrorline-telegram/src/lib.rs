// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport for the Mirrorline relay.
//!
//! Review destinations are forum-enabled supergroups: every mirrored user
//! gets a forum topic, batches are posted into it, and the control panel is
//! an inline keyboard pinned at the top. Each client bot posts with its own
//! token, obtained from a [`CredentialProvider`].

pub mod callbacks;
pub mod credentials;
pub mod errors;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MessageId as TgMessageId, ThreadId as TgThreadId,
};
use tracing::{debug, info};

use mirrorline_config::model::TelegramConfig;
use mirrorline_core::{
    AdapterType, BotId, ControlPanel, CredentialProvider, DestinationId, HealthStatus, MessageId,
    MirrorError, PluginAdapter, ThreadId, TransportClient, TransportErrorKind,
};

pub use callbacks::spawn_callback_listeners;
pub use credentials::ConfigCredentials;

/// Telegram's limit on message text, in UTF-16 code units.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram's limit on forum topic names, in characters.
const MAX_TOPIC_NAME: usize = 128;

/// Telegram transport implementing [`TransportClient`].
pub struct TelegramTransport {
    credentials: Arc<dyn CredentialProvider>,
    api_url: Option<reqwest::Url>,
    bots: DashMap<BotId, Bot>,
}

impl TelegramTransport {
    pub fn new(
        config: &TelegramConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, MirrorError> {
        let api_url = config
            .api_url
            .as_deref()
            .map(|raw| {
                raw.parse::<reqwest::Url>()
                    .map_err(|e| MirrorError::Config(format!("telegram.api_url is invalid: {e}")))
            })
            .transpose()?;

        Ok(Self {
            credentials,
            api_url,
            bots: DashMap::new(),
        })
    }

    /// The teloxide client for `bot`, built on first use.
    pub async fn bot(&self, bot: BotId) -> Result<Bot, MirrorError> {
        if let Some(client) = self.bots.get(&bot) {
            return Ok(client.clone());
        }

        let token = self.credentials.token(bot).await?.ok_or_else(|| {
            MirrorError::transport(
                TransportErrorKind::Permanent,
                format!("no API token for bot {bot}"),
            )
        })?;
        let mut client = Bot::new(token);
        if let Some(url) = &self.api_url {
            client = client.set_api_url(url.clone());
        }
        debug!(bot_id = %bot, "telegram client created");

        Ok(self.bots.entry(bot).or_insert(client).clone())
    }
}

#[async_trait]
impl PluginAdapter for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorError> {
        let clients: Vec<(BotId, Bot)> = self
            .bots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        if clients.is_empty() {
            return Ok(HealthStatus::Degraded("no bot has posted yet".into()));
        }

        for (bot, client) in clients {
            if let Err(e) = client.get_me().await {
                return Ok(HealthStatus::Unhealthy(format!(
                    "Telegram bot {bot} unreachable: {e}"
                )));
            }
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorError> {
        debug!("Telegram transport shutting down");
        self.bots.clear();
        Ok(())
    }
}

#[async_trait]
impl TransportClient for TelegramTransport {
    fn max_message_length(&self) -> usize {
        MAX_MESSAGE_LENGTH
    }

    async fn create_thread(
        &self,
        bot: BotId,
        destination: &DestinationId,
        name: &str,
    ) -> Result<ThreadId, MirrorError> {
        let client = self.bot(bot).await?;
        let chat = chat_id(destination)?;
        let name: String = name.chars().take(MAX_TOPIC_NAME).collect();

        let topic = client
            .create_forum_topic(chat, name)
            .await
            .map_err(|e| errors::to_mirror_error("failed to create forum topic", e))?;

        let thread = ThreadId(topic.thread_id.0.0.to_string());
        info!(bot_id = %bot, destination = %destination, thread_id = %thread, "forum topic created");
        Ok(thread)
    }

    async fn post_message(
        &self,
        bot: BotId,
        destination: &DestinationId,
        thread: &ThreadId,
        text: &str,
        panel: Option<&ControlPanel>,
    ) -> Result<MessageId, MirrorError> {
        let client = self.bot(bot).await?;
        let mut request = client
            .send_message(chat_id(destination)?, text)
            .message_thread_id(thread_id(thread)?);
        if let Some(panel) = panel {
            request = request.reply_markup(keyboard(panel));
        }

        let sent = request
            .await
            .map_err(|e| errors::to_mirror_error("failed to send message", e))?;
        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn pin_message(
        &self,
        bot: BotId,
        destination: &DestinationId,
        message: &MessageId,
    ) -> Result<(), MirrorError> {
        let client = self.bot(bot).await?;
        let id = message.0.parse::<i32>().map_err(|e| {
            MirrorError::transport(
                TransportErrorKind::Permanent,
                format!("invalid message id `{message}`: {e}"),
            )
        })?;

        client
            .pin_chat_message(chat_id(destination)?, TgMessageId(id))
            .disable_notification(true)
            .await
            .map_err(|e| errors::to_mirror_error("failed to pin message", e))?;
        Ok(())
    }
}

fn chat_id(destination: &DestinationId) -> Result<ChatId, MirrorError> {
    destination.0.parse::<i64>().map(ChatId).map_err(|e| {
        MirrorError::transport(
            TransportErrorKind::Permanent,
            format!("invalid chat id `{destination}`: {e}"),
        )
    })
}

fn thread_id(thread: &ThreadId) -> Result<TgThreadId, MirrorError> {
    thread
        .0
        .parse::<i32>()
        .map(|id| TgThreadId(TgMessageId(id)))
        .map_err(|e| {
            MirrorError::transport(
                TransportErrorKind::ThreadGone,
                format!("invalid thread id `{thread}`: {e}"),
            )
        })
}

/// Inline keyboard with one callback button per control-panel button.
fn keyboard(panel: &ControlPanel) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(panel.buttons.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.token.clone()))
            .collect::<Vec<_>>()
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use mirrorline_core::{ControlButton, UserId};

    use super::*;

    fn transport(tokens: &[(&str, &str)]) -> TelegramTransport {
        let config = TelegramConfig {
            bot_tokens: tokens
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..TelegramConfig::default()
        };
        let creds = Arc::new(ConfigCredentials::from_config(&config).unwrap());
        TelegramTransport::new(&config, creds).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_permanent() {
        let transport = transport(&[]);
        let err = transport.bot(BotId(7)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn clients_are_built_once_per_bot() {
        let transport = transport(&[("7", "7:token")]);
        transport.bot(BotId(7)).await.unwrap();
        transport.bot(BotId(7)).await.unwrap();
        assert_eq!(transport.bots.len(), 1);
    }

    #[test]
    fn invalid_api_url_is_a_config_error() {
        let config = TelegramConfig {
            api_url: Some("not a url".into()),
            ..TelegramConfig::default()
        };
        let creds = Arc::new(ConfigCredentials::from_config(&config).unwrap());
        assert!(TelegramTransport::new(&config, creds).is_err());
    }

    #[test]
    fn ids_parse_or_fail_permanently() {
        assert_eq!(chat_id(&DestinationId("-100123".into())).unwrap(), ChatId(-100123));
        assert!(!chat_id(&DestinationId("group".into())).unwrap_err().is_retryable());
        assert_eq!(
            thread_id(&ThreadId("42".into())).unwrap(),
            TgThreadId(TgMessageId(42))
        );
    }

    #[test]
    fn keyboard_mirrors_panel_rows() {
        let panel = ControlPanel {
            text: format!("controls for {}", UserId(1)),
            buttons: vec![
                vec![
                    ControlButton { label: "Ban".into(), token: "ban_1".into() },
                    ControlButton { label: "Unban".into(), token: "unban_1".into() },
                ],
                vec![ControlButton { label: "Reset".into(), token: "reset_1".into() }],
            ],
        };
        let markup = keyboard(&panel);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Reset");
    }
}
