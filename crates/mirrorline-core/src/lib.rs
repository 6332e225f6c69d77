// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mirrorline conversation relay.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Mirrorline workspace. Every store and
//! transport backend implements traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{MirrorError, TransportErrorKind};
pub use types::{
    AdapterType, BotId, ControlAction, ControlButton, ControlPanel, DeliveryMode, DestinationId,
    HealthStatus, Job, JobStatus, MessageId, MirrorConfig, NewJob, NewThread, RelayItem, Role,
    RoutingMode, ShadowBuffer, ShadowStatus, ThreadHandle, ThreadId, UserId, UserMirrorState,
    format_timestamp, parse_timestamp,
};

// Re-export all adapter traits at crate root.
pub use traits::{
    CacheStore, ConversationEngine, CredentialProvider, DirectoryService, PluginAdapter,
    StorageAdapter, TransportClient,
};
