// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ephemeral cache for the Mirrorline relay.
//!
//! [`MemoryCache`] is an in-process [`CacheStore`](mirrorline_core::CacheStore)
//! with per-key TTLs. [`TypedCache`] layers serde (de)serialization and the
//! cache-then-store read path on top of any `CacheStore`.

pub mod keys;
pub mod memory;
pub mod typed;

pub use memory::MemoryCache;
pub use typed::TypedCache;
