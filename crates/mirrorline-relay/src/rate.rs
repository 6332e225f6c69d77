// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-bot send-rate ceiling over one-second fixed windows.
//!
//! The window counter lives in the shared cache so every relay process draws
//! from the same budget. A cache failure lets the send through.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use mirrorline_cache::keys;
use mirrorline_core::{BotId, CacheStore};

/// Counter keys outlive their window briefly so late increments still expire.
const WINDOW_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// The window is exhausted; try again after `retry_after`.
    Limited { retry_after: Duration },
}

pub struct RateGate {
    cache: Arc<dyn CacheStore>,
    per_second: u32,
}

impl RateGate {
    pub fn new(cache: Arc<dyn CacheStore>, per_second: u32) -> Self {
        Self { cache, per_second }
    }

    /// Take one send token for `bot` in the window containing `now`.
    pub async fn acquire(&self, bot: BotId, now: DateTime<Utc>) -> RateDecision {
        if self.per_second == 0 {
            return RateDecision::Allowed;
        }

        let key = keys::rate_window(bot, now.timestamp());
        match self.cache.incr(&key, Some(WINDOW_TTL)).await {
            Ok(used) if used <= i64::from(self.per_second) => RateDecision::Allowed,
            Ok(used) => {
                let into_window = u64::from(now.timestamp_subsec_millis().min(999));
                let retry_after = Duration::from_millis(1000 - into_window);
                debug!(bot_id = %bot, used, ?retry_after, "send rate exhausted");
                RateDecision::Limited { retry_after }
            }
            Err(e) => {
                warn!(bot_id = %bot, error = %e, "rate counter unavailable, allowing send");
                RateDecision::Allowed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mirrorline_cache::MemoryCache;

    use super::*;

    fn gate(limit: u32) -> RateGate {
        RateGate::new(Arc::new(MemoryCache::new()), limit)
    }

    #[tokio::test]
    async fn window_allows_exactly_the_limit() {
        let gate = gate(3);
        let now = Utc.timestamp_millis_opt(1_700_000_000_250).unwrap();

        for _ in 0..3 {
            assert_eq!(gate.acquire(BotId(7), now).await, RateDecision::Allowed);
        }
        assert_eq!(
            gate.acquire(BotId(7), now).await,
            RateDecision::Limited {
                retry_after: Duration::from_millis(750)
            }
        );
    }

    #[tokio::test]
    async fn next_window_and_other_bots_are_independent() {
        let gate = gate(1);
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        assert_eq!(gate.acquire(BotId(7), now).await, RateDecision::Allowed);
        assert_eq!(gate.acquire(BotId(8), now).await, RateDecision::Allowed);
        assert!(matches!(
            gate.acquire(BotId(7), now).await,
            RateDecision::Limited { .. }
        ));

        let next = now + chrono::TimeDelta::seconds(1);
        assert_eq!(gate.acquire(BotId(7), next).await, RateDecision::Allowed);
    }
}
