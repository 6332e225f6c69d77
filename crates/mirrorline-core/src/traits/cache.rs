// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ephemeral cache trait: keyed values, counters, locks, and ordered lists.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MirrorError;
use crate::traits::adapter::PluginAdapter;

/// Shared volatile key-value store.
///
/// Every worker sees the same cache, so every operation that participates in
/// a read-modify-write must be atomic per key.
#[async_trait]
pub trait CacheStore: PluginAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, MirrorError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>)
    -> Result<(), MirrorError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, MirrorError>;

    /// Sets the key only if it is absent. Returns whether the value was written.
    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, MirrorError>;

    /// Increments a counter, creating it at 1 with `ttl` when absent.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, MirrorError>;

    /// Appends to the tail of a list. Returns the new length.
    async fn list_push(&self, key: &str, value: String) -> Result<usize, MirrorError>;

    /// Inserts values at the head of a list, ahead of any live entries.
    async fn list_prepend(&self, key: &str, values: Vec<String>) -> Result<usize, MirrorError>;

    /// Returns up to `count` entries from the head without removing them.
    async fn list_head(&self, key: &str, count: usize) -> Result<Vec<String>, MirrorError>;

    async fn list_len(&self, key: &str) -> Result<usize, MirrorError>;

    /// Removes and returns every entry present at call time.
    async fn list_take_all(&self, key: &str) -> Result<Vec<String>, MirrorError>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, MirrorError>;
}
