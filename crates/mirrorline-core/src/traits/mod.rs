// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter and collaborator trait definitions.
//!
//! Backends extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod cache;
pub mod collaborators;
pub mod storage;
pub mod transport;

pub use adapter::PluginAdapter;
pub use cache::CacheStore;
pub use collaborators::{ConversationEngine, CredentialProvider, DirectoryService};
pub use storage::StorageAdapter;
pub use transport::TransportClient;
