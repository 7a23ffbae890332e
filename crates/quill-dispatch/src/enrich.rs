// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caching decorator for context enrichment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::{ContextEnricher, JobPayload, QuillError};
use tracing::debug;

use crate::cache::TtlCache;

/// Caches enrichment results per set of context references.
///
/// Failures are not cached, so a flaky lookup is retried by the next job.
pub struct CachingEnricher {
    inner: Arc<dyn ContextEnricher>,
    cache: TtlCache<Vec<String>, Option<serde_json::Value>>,
}

impl CachingEnricher {
    pub fn new(inner: Arc<dyn ContextEnricher>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn cache(&self) -> &TtlCache<Vec<String>, Option<serde_json::Value>> {
        &self.cache
    }

    fn cache_key(payload: &JobPayload) -> Vec<String> {
        let mut refs = payload.context_refs.clone();
        refs.sort();
        refs.dedup();
        refs
    }
}

#[async_trait]
impl ContextEnricher for CachingEnricher {
    async fn enrich(&self, payload: &JobPayload) -> Result<Option<serde_json::Value>, QuillError> {
        if payload.context_refs.is_empty() {
            return self.inner.enrich(payload).await;
        }

        let key = Self::cache_key(payload);
        if let Some(hit) = self.cache.get(&key) {
            debug!(refs = key.len(), "enrichment cache hit");
            return Ok(hit);
        }

        let resolved = self.inner.enrich(payload).await?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn evict_expired(&self) -> usize {
        let evicted = self.cache.sweep_expired() + self.inner.evict_expired();
        if evicted > 0 {
            debug!(evicted, "evicted expired enrichment results");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ContextEnricher for Counting {
        async fn enrich(&self, payload: &JobPayload) -> Result<Option<serde_json::Value>, QuillError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(QuillError::Enrichment {
                    message: "lookup down".into(),
                });
            }
            Ok(Some(serde_json::json!({ "refs": payload.context_refs })))
        }
    }

    fn payload(refs: &[&str]) -> JobPayload {
        JobPayload {
            model: "m".into(),
            context_refs: refs.iter().map(|r| r.to_string()).collect(),
            ..JobPayload::default()
        }
    }

    #[tokio::test]
    async fn same_refs_in_any_order_hit_cache() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let enricher = CachingEnricher::new(inner.clone(), Duration::from_secs(60));

        enricher.enrich(&payload(&["brand:1", "doc:2"])).await.unwrap();
        enricher.enrich(&payload(&["doc:2", "brand:1"])).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        enricher.enrich(&payload(&["doc:3"])).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_expired_drops_stale_ref_sets() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let enricher = CachingEnricher::new(inner, Duration::from_secs(60));
        enricher.enrich(&payload(&["brand:1"])).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        enricher.enrich(&payload(&["brand:2"])).await.unwrap();
        assert_eq!(enricher.evict_expired(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(enricher.evict_expired(), 1);
        assert_eq!(enricher.cache().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let enricher = CachingEnricher::new(inner.clone(), Duration::from_secs(60));

        assert!(enricher.enrich(&payload(&["brand:1"])).await.is_err());
        assert!(enricher.enrich(&payload(&["brand:1"])).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(enricher.cache().is_empty());
    }
}
