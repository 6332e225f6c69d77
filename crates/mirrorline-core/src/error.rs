// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mirrorline relay.

use std::time::Duration;

use thiserror::Error;

/// How a transport failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Network timeout or destination temporarily unreachable.
    Transient,
    /// The destination API asked us to slow down.
    RateLimited { retry_after: Duration },
    /// The remote discussion thread no longer exists.
    ThreadGone,
    /// Destination deleted, bot removed as admin, bad credentials.
    Permanent,
}

/// The primary error type used across all Mirrorline adapter traits and relay operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Configuration errors (invalid TOML, missing credentials, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable store errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Ephemeral cache errors.
    #[error("cache error: {0}")]
    Cache(String),

    /// Transport client errors (thread creation, posting, pinning).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        kind: TransportErrorKind,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Another worker holds the critical section for this key.
    #[error("key `{key}` is locked by another worker")]
    Contended { key: String },

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            kind,
            source: None,
        }
    }

    /// Whether retrying the failed operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => !matches!(kind, TransportErrorKind::Permanent),
            Self::Storage { .. } | Self::Cache(_) | Self::Contended { .. } | Self::Timeout { .. } => {
                true
            }
            Self::Config(_) | Self::NotFound(_) | Self::Internal(_) => false,
        }
    }

    /// Delay requested by the remote side, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport {
                kind: TransportErrorKind::RateLimited { retry_after },
                ..
            } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the transport reported that the destination thread is gone.
    pub fn is_thread_gone(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::ThreadGone,
                ..
            }
        )
    }
}
