//! Caching layer for embeddings
//!
//! Wraps any [`Embedder`] with a thread-safe LRU+TTL cache keyed by text
//! hash, so repeated propositions (repair runs, repeated queries) are not
//! re-embedded.
//!
//! Uses the moka crate for async-compatible concurrent caching.

use async_trait::async_trait;
use moka::future::Cache;
use quiver_core::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::Embedder;

/// Cache hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

/// Caching wrapper around an embedder.
#[derive(Clone)]
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache<u64, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedder {
    /// Wrap `inner` with a cache of `capacity` entries and `ttl_secs` TTL.
    pub fn with_capacity(inner: Arc<dyn Embedder>, capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = hash_text(text);
        if let Some(cached) = self.cache.get(&key).await {
            self.stats.record_hit();
            return Ok(cached);
        }
        self.stats.record_miss();

        let vector = self.inner.embed(text).await?;
        self.cache.insert(key, vector.clone()).await;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve what we can from cache, keeping input order.
        let mut resolved: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(&hash_text(text)).await {
                Some(cached) => {
                    self.stats.record_hit();
                    resolved.push(Some(cached));
                }
                None => {
                    self.stats.record_miss();
                    resolved.push(None);
                    missing.push(i);
                }
            }
        }

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&to_embed).await?;

            for (&i, vector) in missing.iter().zip(fresh) {
                self.cache.insert(hash_text(&texts[i]), vector.clone()).await;
                resolved[i] = Some(vector);
            }
        }

        Ok(resolved.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts inner calls; embeds every text as a constant vector.
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let texts = [text.to_string()];
            Ok(self.embed_batch(&texts).await?.remove(0))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn counting() -> (Arc<CountingEmbedder>, CachedEmbedder) {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedder::with_capacity(inner.clone(), 100, 60);
        (inner, cached)
    }

    #[tokio::test]
    async fn test_repeat_embed_hits_cache() {
        let (inner, cached) = counting();

        cached.embed("The sky is blue.").await.unwrap();
        cached.embed("The sky is blue.").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.stats().hits(), 1);
        assert_eq!(cached.stats().misses(), 1);
    }

    #[tokio::test]
    async fn test_batch_embeds_only_misses() {
        let (inner, cached) = counting();

        cached.embed("a").await.unwrap();

        let batch = cached
            .embed_batch(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(batch.len(), 3);
        // "a" was cached; only "b" and "c" reach the inner embedder.
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let (_, cached) = counting();
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        let batch = cached.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 5);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_text("same"), hash_text("same"));
        assert_ne!(hash_text("same"), hash_text("different"));
    }
}
