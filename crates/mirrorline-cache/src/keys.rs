// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache key layout shared by every relay component.

use mirrorline_core::{BotId, UserId};

pub const CONFIG_PREFIX: &str = "mirror_config";
pub const THREAD_PREFIX: &str = "mirror_thread";
pub const USER_STATE_PREFIX: &str = "mirror_user_state";
pub const BUFFER_PREFIX: &str = "mirror_buffer:";

pub fn config(bot: BotId) -> String {
    format!("{bot}")
}

pub fn pair(bot: BotId, user: UserId) -> String {
    format!("{bot}:{user}")
}

pub fn buffer(bot: BotId, user: UserId) -> String {
    format!("{BUFFER_PREFIX}{bot}:{user}")
}

pub fn buffer_count(bot: BotId, user: UserId) -> String {
    format!("mirror_buffer_count:{bot}:{user}")
}

pub fn thread_lock(bot: BotId, user: UserId) -> String {
    format!("mirror_thread_lock:{bot}:{user}")
}

pub fn flush_lock(bot: BotId, user: UserId) -> String {
    format!("mirror_flush_lock:{bot}:{user}")
}

pub fn rate_window(bot: BotId, epoch_sec: i64) -> String {
    format!("mirror_rate:{bot}:{epoch_sec}")
}

/// Recover the pair from a `mirror_buffer:{bot}:{user}` key.
pub fn parse_buffer_key(key: &str) -> Option<(BotId, UserId)> {
    let (bot, user) = key.strip_prefix(BUFFER_PREFIX)?.split_once(':')?;
    Some((BotId(bot.parse().ok()?), UserId(user.parse().ok()?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keys_round_trip() {
        let key = buffer(BotId(7), UserId(42));
        assert_eq!(key, "mirror_buffer:7:42");
        assert_eq!(parse_buffer_key(&key), Some((BotId(7), UserId(42))));
    }

    #[test]
    fn counter_keys_do_not_parse_as_buffers() {
        assert_eq!(parse_buffer_key(&buffer_count(BotId(7), UserId(42))), None);
        assert_eq!(parse_buffer_key("mirror_buffer:x:1"), None);
    }
}
