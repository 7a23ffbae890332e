// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent map whose entries expire after a fixed time-to-live.

use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a live entry. An expired entry is removed and reads as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            let (value, inserted) = entry.value();
            if inserted.elapsed() < self.ttl {
                return Some(value.clone());
            }
        }
        // Re-checked so a concurrent fresh insert survives.
        let ttl = self.ttl;
        self.entries
            .remove_if(key, |_, (_, inserted)| inserted.elapsed() >= ttl);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), Some(1));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("old", 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("new", 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("k".to_string(), "v".to_string());
        assert!(cache.invalidate(&"k".to_string()));
        assert!(!cache.invalidate(&"k".to_string()));
        assert_eq!(cache.len(), 0);
    }
}
