// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process cache store backed by a sharded concurrent map.
//!
//! Every operation runs under the shard lock of its key, which makes the
//! read-modify-write operations (`set_nx`, `incr`, list pushes and drains)
//! atomic per key. Expired entries are treated as absent and reclaimed
//! lazily, plus a periodic sweep every few thousand writes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use mirrorline_core::{AdapterType, CacheStore, HealthStatus, MirrorError, PluginAdapter};

const CLEANUP_EVERY_WRITES: u64 = 4096;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(i64),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn wrong_type(key: &str, expected: &str) -> MirrorError {
    MirrorError::Cache(format!("key `{key}` does not hold a {expected}"))
}

/// Shared in-process cache.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Slot>>,
    writes: Arc<AtomicU64>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, as a cache restart would.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn note_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % CLEANUP_EVERY_WRITES == 0 {
            let now = Instant::now();
            self.entries.retain(|_, slot| slot.is_live(now));
        }
    }

    /// Entry for `key`, with an expired slot already removed.
    fn live_entry(&self, key: &str) -> Entry<'_, String, Slot> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) if !occupied.get().is_live(now) => {
                let (key, _) = occupied.remove_entry();
                self.entries.entry(key)
            }
            entry => entry,
        }
    }
}

#[async_trait]
impl PluginAdapter for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Cache
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorError> {
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(slot) if slot.is_live(now) => match &slot.value {
                Value::Text(s) => Ok(Some(s.clone())),
                Value::Counter(n) => Ok(Some(n.to_string())),
                Value::List(_) => Err(wrong_type(key, "string")),
            },
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), MirrorError> {
        self.entries
            .insert(key.to_string(), Slot::new(Value::Text(value), ttl));
        self.note_write();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, MirrorError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| slot.is_live(now)))
    }

    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, MirrorError> {
        let written = match self.live_entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(Value::Text(value), Some(ttl)));
                true
            }
        };
        if written {
            self.note_write();
        }
        Ok(written)
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, MirrorError> {
        let next = match self.live_entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(Value::Counter(1), ttl));
                1
            }
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                let next = match &slot.value {
                    Value::Counter(n) => n + 1,
                    Value::Text(s) => {
                        s.parse::<i64>().map_err(|_| wrong_type(key, "counter"))? + 1
                    }
                    Value::List(_) => return Err(wrong_type(key, "counter")),
                };
                slot.value = Value::Counter(next);
                next
            }
        };
        self.note_write();
        Ok(next)
    }

    async fn list_push(&self, key: &str, value: String) -> Result<usize, MirrorError> {
        let result = match self.live_entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(Value::List(VecDeque::from([value])), None));
                Ok(1)
            }
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().value {
                Value::List(list) => {
                    list.push_back(value);
                    Ok(list.len())
                }
                _ => Err(wrong_type(key, "list")),
            },
        };
        self.note_write();
        result
    }

    async fn list_prepend(&self, key: &str, values: Vec<String>) -> Result<usize, MirrorError> {
        if values.is_empty() {
            return self.list_len(key).await;
        }
        let result = match self.live_entry(key) {
            Entry::Vacant(vacant) => {
                let len = values.len();
                vacant.insert(Slot::new(Value::List(values.into()), None));
                Ok(len)
            }
            Entry::Occupied(mut occupied) => match &mut occupied.get_mut().value {
                Value::List(list) => {
                    for value in values.into_iter().rev() {
                        list.push_front(value);
                    }
                    Ok(list.len())
                }
                _ => Err(wrong_type(key, "list")),
            },
        };
        self.note_write();
        result
    }

    async fn list_head(&self, key: &str, count: usize) -> Result<Vec<String>, MirrorError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(slot) if slot.is_live(now) => match &slot.value {
                Value::List(list) => Ok(list.iter().take(count).cloned().collect()),
                _ => Err(wrong_type(key, "list")),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize, MirrorError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(slot) if slot.is_live(now) => match &slot.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(wrong_type(key, "list")),
            },
            _ => Ok(0),
        }
    }

    async fn list_take_all(&self, key: &str) -> Result<Vec<String>, MirrorError> {
        match self.live_entry(key) {
            Entry::Vacant(_) => Ok(Vec::new()),
            Entry::Occupied(occupied) => {
                if !matches!(occupied.get().value, Value::List(_)) {
                    return Err(wrong_type(key, "list"));
                }
                match occupied.remove().value {
                    Value::List(list) => Ok(list.into()),
                    _ => Ok(Vec::new()),
                }
            }
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, MirrorError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live(now))
            .map(|e| e.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".into(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_nx_respects_live_and_expired_holders() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(30);
        assert!(cache.set_nx("lock", "a".into(), ttl).await.unwrap());
        assert!(!cache.set_nx("lock", "b".into(), ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.set_nx("lock", "c".into(), ttl).await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn counter_window_resets_after_ttl() {
        let cache = MemoryCache::new();
        let ttl = Some(Duration::from_secs(2));
        assert_eq!(cache.incr("rate", ttl).await.unwrap(), 1);
        assert_eq!(cache.incr("rate", ttl).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.incr("rate", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_operations_preserve_order() {
        let cache = MemoryCache::new();
        for v in ["c", "d"] {
            cache.list_push("buf", v.into()).await.unwrap();
        }
        let len = cache
            .list_prepend("buf", vec!["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(len, 4);
        assert_eq!(cache.list_head("buf", 2).await.unwrap(), ["a", "b"]);

        let drained = cache.list_take_all("buf").await.unwrap();
        assert_eq!(drained, ["a", "b", "c", "d"]);
        assert!(cache.list_take_all("buf").await.unwrap().is_empty());
        assert_eq!(cache.list_len("buf").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let cache = MemoryCache::new();
        cache.set("s", "x".into(), None).await.unwrap();
        assert!(cache.list_push("s", "y".into()).await.is_err());
        assert!(cache.incr("s", None).await.is_err());
    }

    #[tokio::test]
    async fn keys_with_prefix_lists_live_keys() {
        let cache = MemoryCache::new();
        cache.list_push("mirror_buffer:1:2", "x".into()).await.unwrap();
        cache.list_push("mirror_buffer:1:3", "y".into()).await.unwrap();
        cache.set("mirror_config:1", "{}".into(), None).await.unwrap();

        let mut keys = cache.keys_with_prefix("mirror_buffer:").await.unwrap();
        keys.sort();
        assert_eq!(keys, ["mirror_buffer:1:2", "mirror_buffer:1:3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_set_nx_has_one_winner() {
        let cache = MemoryCache::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .set_nx("lock", i.to_string(), Duration::from_secs(30))
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
