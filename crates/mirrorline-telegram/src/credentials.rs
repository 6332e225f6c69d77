// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot API tokens from the `[telegram.bot_tokens]` table.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use mirrorline_config::model::TelegramConfig;
use mirrorline_core::{BotId, CredentialProvider, MirrorError};

/// Token per bot, held as secrets so they never show up in debug output.
pub struct ConfigCredentials {
    tokens: HashMap<BotId, SecretString>,
}

impl ConfigCredentials {
    /// Keys must be numeric bot IDs; validation rejects anything else.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, MirrorError> {
        let mut tokens = HashMap::with_capacity(config.bot_tokens.len());
        for (key, token) in &config.bot_tokens {
            let bot = key.parse::<i64>().map(BotId).map_err(|_| {
                MirrorError::Config(format!("telegram.bot_tokens key `{key}` is not a bot ID"))
            })?;
            tokens.insert(bot, SecretString::from(token.clone()));
        }
        Ok(Self { tokens })
    }

    pub fn bots(&self) -> impl Iterator<Item = BotId> + '_ {
        self.tokens.keys().copied()
    }
}

#[async_trait]
impl CredentialProvider for ConfigCredentials {
    async fn token(&self, bot: BotId) -> Result<Option<String>, MirrorError> {
        Ok(self
            .tokens
            .get(&bot)
            .map(|secret| secret.expose_secret().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn config(tokens: &[(&str, &str)]) -> TelegramConfig {
        TelegramConfig {
            bot_tokens: tokens
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..TelegramConfig::default()
        }
    }

    #[tokio::test]
    async fn tokens_are_keyed_by_bot_id() {
        let creds = ConfigCredentials::from_config(&config(&[("7", "7:abc")])).unwrap();
        assert_eq!(creds.token(BotId(7)).await.unwrap().as_deref(), Some("7:abc"));
        assert_eq!(creds.token(BotId(8)).await.unwrap(), None);
    }

    #[test]
    fn non_numeric_keys_are_rejected() {
        assert!(ConfigCredentials::from_config(&config(&[("main", "x")])).is_err());
    }
}
