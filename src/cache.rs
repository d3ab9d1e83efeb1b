// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded in-process cache with per-entry expiry.
//!
//! Entries are evicted least-recently-used once capacity is reached, and
//! dropped on read once their time-to-live has elapsed.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Cached value plus the instant it stops being served.
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process LRU cache keyed by string.
pub struct MemoryCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
}

impl<V: Clone> MemoryCache<V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a live entry. Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        if let Some(entry) = entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.value.clone());
            }
            entries.pop(key);
        }
        None
    }

    /// Insert or replace an entry that lives for `ttl`.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key.into(),
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        entries.pop(key).map(|entry| entry.value)
    }

    /// Number of stored entries, including ones that expired but were not read yet.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
