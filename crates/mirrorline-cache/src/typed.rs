// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed cache-then-store reads.
//!
//! Values are stored as JSON under `{prefix}:{id}`. Reads fail open: a cache
//! error or an undecodable entry is logged and treated as a miss, so the
//! durable store stays authoritative.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use mirrorline_core::{CacheStore, MirrorError};

/// A cached view of one entity type.
pub struct TypedCache<T> {
    store: Arc<dyn CacheStore>,
    prefix: &'static str,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix,
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<T> TypedCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn CacheStore>, prefix: &'static str, ttl: Duration) -> Self {
        Self {
            store,
            prefix,
            ttl,
            _marker: PhantomData,
        }
    }

    pub fn key(&self, id: &str) -> String {
        format!("{}:{id}", self.prefix)
    }

    /// Cached value, or `None` on miss, error, or undecodable entry.
    pub async fn get(&self, id: &str) -> Option<T> {
        let key = self.key(id);
        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Write a value with this cache's TTL.
    pub async fn put(&self, id: &str, value: &T) -> Result<(), MirrorError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| MirrorError::Internal(format!("cache encode failed: {e}")))?;
        self.store.set(&self.key(id), raw, Some(self.ttl)).await
    }

    pub async fn invalidate(&self, id: &str) -> Result<(), MirrorError> {
        self.store.delete(&self.key(id)).await.map(|_| ())
    }

    /// Cached value, or the result of `load` (cached on `Some`).
    ///
    /// Loader errors propagate; failing to populate the cache does not.
    pub async fn get_or_load<F, Fut>(&self, id: &str, load: F) -> Result<Option<T>, MirrorError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, MirrorError>> + Send,
    {
        if let Some(value) = self.get(id).await {
            return Ok(Some(value));
        }
        let loaded = load().await?;
        if let Some(value) = &loaded
            && let Err(e) = self.put(id, value).await
        {
            warn!(key = %self.key(id), error = %e, "cache populate failed");
        }
        Ok(loaded)
    }
}
