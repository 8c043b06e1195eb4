//! Query-time retrieval across the embedding provider and the vector store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::{ErrorKind, RetrieveError};
use crate::models::{CacheConfig, ResilienceConfig, SearchResult};
use crate::resilience::CallGuard;
use crate::services::cache::ResultCache;
use crate::services::embedding::EmbeddingProvider;
use crate::services::vector_store::VectorStore;
use crate::utils::calculate_checksum;

/// Orchestrates embed-then-search, degrading to empty results when a
/// dependency is down.
///
/// The only errors `retrieve` returns are argument errors. Provider outages
/// are logged, counted, and reported as an empty result set so a failing
/// embedding service cannot take the caller down with it.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    embed_guard: CallGuard,
    search_guard: CallGuard,
    cache: Option<Arc<ResultCache<Vec<SearchResult>>>>,
    degraded: AtomicU64,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        resilience: &ResilienceConfig,
        cache: &CacheConfig,
    ) -> Self {
        let cache = cache
            .enabled
            .then(|| Arc::new(ResultCache::from_config(cache)));

        Self {
            embedder,
            store,
            embed_guard: CallGuard::new("embedding", &resilience.embedding, &resilience.breaker),
            search_guard: CallGuard::new("vector-store", &resilience.search, &resilience.breaker),
            cache,
            degraded: AtomicU64::new(0),
        }
    }

    /// Retrieve the `top_k` most similar chunks for a query.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, RetrieveError> {
        if query.trim().is_empty() {
            return Err(RetrieveError::EmptyQuery);
        }
        if top_k == 0 {
            return Err(RetrieveError::ZeroTopK);
        }

        let key = self.cache_key(query, top_k);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                debug!(top_k, "returning cached results");
                return Ok(hit);
            }
        }

        let query_vector = match self.embed_guard.run(|| self.embedder.embed_one(query)).await {
            Ok(vector) => vector,
            Err(err) => return Ok(self.degrade("embedding", err.kind(), &err)),
        };

        let mut results = match self
            .search_guard
            .run(|| self.store.search(query_vector.clone(), top_k))
            .await
        {
            Ok(results) => results,
            Err(err) => return Ok(self.degrade("vector-store", err.kind(), &err)),
        };

        // Backends already rank their output; re-sorting keeps the contract
        // independent of backend quirks.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        if let Some(cache) = &self.cache {
            cache.insert(key, results.clone());
        }

        Ok(results)
    }

    /// How many retrievals degraded to empty results since startup.
    ///
    /// Lets callers tell "no matches" apart from "dependency was down".
    pub fn degraded_count(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(
        &self,
        dependency: &'static str,
        kind: ErrorKind,
        err: &dyn std::fmt::Display,
    ) -> Vec<SearchResult> {
        if kind == ErrorKind::Unavailable {
            warn!(dependency, error = %err, "dependency unavailable, returning no results");
        } else {
            warn!(dependency, error = %err, "dependency gave an unusable answer, returning no results");
        }
        self.degraded.fetch_add(1, Ordering::Relaxed);
        Vec::new()
    }

    /// Key equal queries to the same entry regardless of case and spacing.
    /// Model and backend are part of the key so a config change never
    /// serves vectors from the wrong space.
    fn cache_key(&self, query: &str, top_k: usize) -> String {
        let normalized = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        calculate_checksum(&format!(
            "{}\n{}\n{}\n{}",
            self.embedder.model_name(),
            self.store.name(),
            normalized,
            top_k
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, VectorStoreError};
    use crate::models::{BreakerConfig, Chunk, GuardConfig};
    use async_trait::async_trait;

    struct StubEmbedder {
        calls: AtomicU64,
        fail: bool,
    }

    impl StubEmbedder {
        fn healthy() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Connection("connection refused".to_string()));
            }
            Ok(vec![0.5, 0.5])
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![0.5, 0.5]; texts.len()])
        }

        fn model_name(&self) -> &str {
            "stub-embedder"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct StubStore {
        scores: Vec<f32>,
        fail: bool,
        searches: AtomicU64,
    }

    impl StubStore {
        fn with_scores(scores: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                scores,
                fail: false,
                searches: AtomicU64::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                scores: Vec::new(),
                fail: true,
                searches: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn add_documents(&self, _chunks: Vec<Chunk>) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn search(
            &self,
            _query_vector: Vec<f32>,
            top_k: usize,
        ) -> Result<Vec<SearchResult>, VectorStoreError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VectorStoreError::Connection("store down".to_string()));
            }
            Ok(self
                .scores
                .iter()
                .take(top_k)
                .enumerate()
                .map(|(i, score)| SearchResult {
                    chunk: Chunk::new(format!("text {i}"), i, "doc", "doc.md"),
                    score: *score,
                })
                .collect())
        }

        async fn delete_by_source_id(&self, _source_id: &str) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn clear(&self) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<bool, VectorStoreError> {
            Ok(true)
        }

        async fn count_chunks(&self) -> Result<u64, VectorStoreError> {
            Ok(self.scores.len() as u64)
        }

        fn name(&self) -> &'static str {
            "stub-store"
        }
    }

    fn retriever_with(
        embedder: Arc<StubEmbedder>,
        store: Arc<StubStore>,
        cache_enabled: bool,
    ) -> Retriever {
        let guard = GuardConfig {
            timeout_ms: 1_000,
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let resilience = ResilienceConfig {
            embedding: guard.clone(),
            search: guard,
            breaker: BreakerConfig::default(),
        };
        let cache = CacheConfig {
            enabled: cache_enabled,
            capacity: 16,
            ttl_secs: 60,
            sweep_interval_secs: 60,
        };
        Retriever::new(embedder, store, &resilience, &cache)
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let retriever = retriever_with(StubEmbedder::healthy(), StubStore::with_scores(vec![]), true);
        assert_eq!(
            retriever.retrieve("   ", 5).await.unwrap_err(),
            RetrieveError::EmptyQuery
        );
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let retriever = retriever_with(StubEmbedder::healthy(), StubStore::with_scores(vec![]), true);
        assert_eq!(
            retriever.retrieve("query", 0).await.unwrap_err(),
            RetrieveError::ZeroTopK
        );
    }

    #[tokio::test]
    async fn test_results_sorted_by_score_descending() {
        let store = StubStore::with_scores(vec![0.2, 0.9, 0.5]);
        let retriever = retriever_with(StubEmbedder::healthy(), store, false);

        let results = retriever.retrieve("query", 3).await.unwrap();
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.5, 0.2]);
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_empty() {
        let embedder = StubEmbedder::healthy();
        let store = StubStore::failing();
        let retriever = retriever_with(embedder.clone(), store, true);

        let results = retriever.retrieve("query", 5).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(retriever.degraded_count(), 1);
        // The embedding step did run; only the search failed.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_embedder_outage_never_reaches_store() {
        let embedder = StubEmbedder::failing();
        let store = StubStore::with_scores(vec![0.9]);
        let retriever = retriever_with(embedder, store.clone(), true);

        let results = retriever.retrieve("query", 5).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(retriever.degraded_count(), 1);
        assert_eq!(store.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_embedding() {
        let embedder = StubEmbedder::healthy();
        let store = StubStore::with_scores(vec![0.7, 0.3]);
        let retriever = retriever_with(embedder.clone(), store, true);

        let first = retriever.retrieve("what is rust", 2).await.unwrap();
        let second = retriever.retrieve("what is rust", 2).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].chunk.chunk_id, second[0].chunk.chunk_id);
    }

    #[tokio::test]
    async fn test_cache_key_normalizes_case_and_whitespace() {
        let embedder = StubEmbedder::healthy();
        let store = StubStore::with_scores(vec![0.7]);
        let retriever = retriever_with(embedder.clone(), store, true);

        retriever.retrieve("Hello   World", 2).await.unwrap();
        retriever.retrieve("hello world", 2).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_key_distinguishes_top_k() {
        let embedder = StubEmbedder::healthy();
        let store = StubStore::with_scores(vec![0.7]);
        let retriever = retriever_with(embedder.clone(), store, true);

        retriever.retrieve("hello", 2).await.unwrap();
        retriever.retrieve("hello", 3).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_embeds() {
        let embedder = StubEmbedder::healthy();
        let store = StubStore::with_scores(vec![0.7]);
        let retriever = retriever_with(embedder.clone(), store, false);

        retriever.retrieve("hello", 2).await.unwrap();
        retriever.retrieve("hello", 2).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }
}
