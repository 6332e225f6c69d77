// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the relay, its stores, and its transports.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::MirrorError;

/// Identifier of a client chat bot whose conversations are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotId(pub i64);

/// Identifier of an end user talking to a client bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination group or channel on the transport side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub String);

/// Remote discussion-thread identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

/// Remote message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Cache,
    Transport,
}

/// Where mirrored conversations land.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoutingMode {
    /// One destination per bot; threads are named after the end user.
    #[default]
    Individual,
    /// One destination shared by several bots; thread names carry the bot handle.
    Centralized,
}

/// Deployment-wide policy for relaying messages.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryMode {
    /// Every message is flushed as soon as it arrives.
    Realtime,
    /// Messages accumulate until a size or time trigger fires.
    #[default]
    Batch,
}

/// Who authored a relayed item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// Mirroring configuration of one bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub bot_id: BotId,
    /// Review group or channel receiving the threads.
    pub destination: DestinationId,
    pub routing_mode: RoutingMode,
    /// Number of buffered items that triggers an immediate flush.
    pub batch_size: u32,
    /// Longest time the oldest buffered item may wait for delivery.
    pub batch_delay_secs: u64,
    /// Quiet period after the latest item before the deferred flush fires.
    pub flush_timeout_secs: u64,
    pub active: bool,
}

impl MirrorConfig {
    /// Creates an active configuration with default batch parameters.
    pub fn new(bot_id: BotId, destination: DestinationId) -> Self {
        Self {
            bot_id,
            destination,
            routing_mode: RoutingMode::default(),
            batch_size: 10,
            batch_delay_secs: 120,
            flush_timeout_secs: 30,
            active: true,
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::new(BotId(0), DestinationId(String::new()))
    }
}

/// One pending relay item in a buffer.
///
/// The `id` is shared by the ephemeral entry and its shadow copy, so delivery
/// can be acknowledged item by item even when the two lists diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayItem {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub enqueued_at: DateTime<Utc>,
}

impl RelayItem {
    pub fn new(role: Role, content: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            enqueued_at,
        }
    }
}

/// The mapping of a (bot, user) pair to its remote discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    /// Durable record ID; embedded in control-panel callback tokens.
    pub record_id: i64,
    pub bot_id: BotId,
    pub user_id: UserId,
    pub destination: DestinationId,
    pub thread_id: ThreadId,
    pub control_message_id: Option<MessageId>,
    pub messages_relayed: i64,
    pub last_flush_at: Option<DateTime<Utc>>,
}

/// Fields needed to persist a newly created thread.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub bot_id: BotId,
    pub user_id: UserId,
    pub destination: DestinationId,
    pub thread_id: ThreadId,
}

/// Operator-controlled flags for one (bot, user) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMirrorState {
    pub is_banned: bool,
    pub is_ai_paused: bool,
}

/// Lifecycle of a durable shadow buffer record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ShadowStatus {
    /// Items are waiting for a flush.
    Pending,
    /// Claimed by the recovery sweeper; a flush is in flight.
    Sending,
    /// Every item was delivered.
    Sent,
    /// Delivery was abandoned.
    Dropped,
}

/// Durable copy of a buffer, used to survive cache loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowBuffer {
    pub id: i64,
    pub bot_id: BotId,
    pub user_id: UserId,
    pub items: Vec<RelayItem>,
    pub status: ShadowStatus,
    pub scheduled_flush_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a queued job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Replaced by a newer pending job with the same dedupe key.
    Superseded,
}

/// A job to be inserted into the task queue.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: String,
    /// At most one pending job exists per dedupe key; scheduling again moves its due time.
    pub dedupe_key: Option<String>,
    pub payload: String,
    pub run_at: DateTime<Utc>,
    pub max_attempts: u32,
}

/// A job stored in the task queue.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub kind: String,
    pub dedupe_key: Option<String>,
    pub payload: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    /// Whether a failure of the current attempt exhausts the retry budget.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }
}

/// Operator command issued from a thread's control panel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ControlAction {
    Ban,
    Unban,
    Reset,
    PauseAi,
    ResumeAi,
}

impl ControlAction {
    /// Callback token carried by a control-panel button: `{action}_{record_id}`.
    pub fn token(self, record_id: i64) -> String {
        format!("{self}_{record_id}")
    }
}

/// One inline button on a control panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlButton {
    pub label: String,
    pub token: String,
}

/// Pinned message that exposes operator actions for a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPanel {
    pub text: String,
    /// Rows of buttons.
    pub buttons: Vec<Vec<ControlButton>>,
}

/// Formats a timestamp the way every store persists it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses a timestamp written by [`format_timestamp`] (or any RFC 3339 string).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MirrorError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MirrorError::Storage {
            source: Box::new(e),
        })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn control_action_tokens_use_lowercase_names() {
        assert_eq!(ControlAction::Ban.token(17), "ban_17");
        assert_eq!(ControlAction::PauseAi.token(3), "pauseai_3");
        assert_eq!(
            ControlAction::from_str("resumeai").unwrap(),
            ControlAction::ResumeAi
        );
        assert!(ControlAction::from_str("explode").is_err());
    }

    #[test]
    fn mirror_config_defaults() {
        let config = MirrorConfig::new(BotId(7), DestinationId("-100".into()));
        assert!(config.active);
        assert_eq!(config.routing_mode, RoutingMode::Individual);
        assert_eq!(config.flush_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn routing_mode_parses_from_lowercase() {
        assert_eq!(
            RoutingMode::from_str("centralized").unwrap(),
            RoutingMode::Centralized
        );
        assert_eq!(DeliveryMode::from_str("realtime").unwrap(), DeliveryMode::Realtime);
        let json = serde_json::to_string(&Role::Bot).unwrap();
        assert_eq!(json, "\"bot\"");
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert!(a < b);
        assert_eq!(parse_timestamp(&a).unwrap(), early);
    }

    #[test]
    fn final_attempt_detection() {
        let job = Job {
            id: 1,
            kind: "flush".into(),
            dedupe_key: None,
            payload: "{}".into(),
            status: JobStatus::Processing,
            attempts: 2,
            max_attempts: 3,
            run_at: Utc::now(),
            locked_until: None,
            last_error: None,
        };
        assert!(job.is_final_attempt());
    }
}
