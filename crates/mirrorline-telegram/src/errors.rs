// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of Bot API failures onto the relay's retry policy.

use teloxide::RequestError;

use mirrorline_core::{MirrorError, TransportErrorKind};

/// Classify a teloxide request failure.
pub fn classify(error: &RequestError) -> TransportErrorKind {
    match error {
        RequestError::RetryAfter(wait) => TransportErrorKind::RateLimited {
            retry_after: wait.duration(),
        },
        RequestError::Api(api) => classify_description(&api.to_string()),
        RequestError::MigrateToChatId(_) => TransportErrorKind::Permanent,
        _ => TransportErrorKind::Transient,
    }
}

/// Classify a Bot API error description.
pub fn classify_description(description: &str) -> TransportErrorKind {
    let lower = description.to_ascii_lowercase();
    if lower.contains("thread not found")
        || lower.contains("topic_deleted")
        || lower.contains("topic_id_invalid")
    {
        TransportErrorKind::ThreadGone
    } else if lower.contains("too many requests") || lower.contains("internal server error") {
        TransportErrorKind::Transient
    } else {
        TransportErrorKind::Permanent
    }
}

pub fn to_mirror_error(context: &str, error: RequestError) -> MirrorError {
    MirrorError::Transport {
        message: format!("{context}: {error}"),
        kind: classify(&error),
        source: Some(Box::new(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_is_rate_limited() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(42));
        assert_eq!(
            classify(&err),
            TransportErrorKind::RateLimited {
                retry_after: std::time::Duration::from_secs(42)
            }
        );
    }

    #[test]
    fn deleted_topics_are_thread_gone() {
        assert_eq!(
            classify_description("Bad Request: message thread not found"),
            TransportErrorKind::ThreadGone
        );
        assert_eq!(
            classify_description("Bad Request: TOPIC_DELETED"),
            TransportErrorKind::ThreadGone
        );
    }

    #[test]
    fn other_api_errors_are_permanent() {
        assert_eq!(
            classify_description("Forbidden: bot was kicked from the supergroup chat"),
            TransportErrorKind::Permanent
        );
        assert_eq!(
            classify_description("Bad Request: chat not found"),
            TransportErrorKind::Permanent
        );
    }
}
