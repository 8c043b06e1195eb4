//! End-to-end tests for the ingest and retrieve pipeline.
//!
//! Everything runs against an in-memory vector store and a deterministic
//! embedder, so these cover orchestration rather than backend wiring:
//! idempotent re-ingestion, score ordering, cache behavior, and degradation
//! when a dependency is down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ragstore::error::{EmbeddingError, RetrieveError, VectorStoreError};
use ragstore::models::{
    BreakerConfig, CacheConfig, Chunk, ChunkingConfig, GuardConfig, IngestionStatus,
    ResilienceConfig, SearchResult, SentenceMode, TokenizerMode,
};
use ragstore::services::{
    EmbeddingProvider, Ingestor, Retriever, TextChunker, VectorStore, build_token_counter,
};

/// Cheap deterministic text features. Identical text gives an identical
/// vector, so an exact-content query scores 1.0 against its own chunk.
fn embed_text(text: &str) -> Vec<f32> {
    let bytes = text.as_bytes();
    let sum: u64 = bytes.iter().map(|b| u64::from(*b)).sum();
    vec![
        bytes.len() as f32,
        (sum % 101) as f32 + 1.0,
        f32::from(bytes.first().copied().unwrap_or(1)),
    ]
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct CharEmbedder {
    calls: AtomicU64,
    unavailable: AtomicBool,
}

impl CharEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for CharEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Connection("provider down".to_string()));
        }
        Ok(embed_text(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Connection("provider down".to_string()));
        }
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        "char-features"
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Keyed in-memory store with real cosine ranking over stored vectors.
#[derive(Default)]
struct MemoryStore {
    chunks: Mutex<HashMap<String, Chunk>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    fn total(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    fn count_for(&self, source_id: &str) -> usize {
        self.chunks
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.source_id == source_id)
            .count()
    }

    fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn fail_if_down(&self) -> Result<(), VectorStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Connection("store down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<(), VectorStoreError> {
        self.fail_if_down()?;
        let mut map = self.chunks.lock().unwrap();
        for chunk in chunks {
            map.insert(chunk.chunk_id.clone(), chunk);
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        self.fail_if_down()?;
        let map = self.chunks.lock().unwrap();
        let mut results: Vec<SearchResult> = map
            .values()
            .map(|chunk| SearchResult {
                score: cosine(&query_vector, &chunk.vector),
                chunk: Chunk {
                    vector: Vec::new(),
                    ..chunk.clone()
                },
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete_by_source_id(&self, source_id: &str) -> Result<(), VectorStoreError> {
        self.fail_if_down()?;
        self.chunks
            .lock()
            .unwrap()
            .retain(|_, c| c.source_id != source_id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        self.fail_if_down()?;
        self.chunks.lock().unwrap().clear();
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }

    async fn count_chunks(&self) -> Result<u64, VectorStoreError> {
        Ok(self.total() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn fast_resilience() -> ResilienceConfig {
    let guard = GuardConfig {
        timeout_ms: 1_000,
        max_retries: 1,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    };
    ResilienceConfig {
        embedding: guard.clone(),
        search: guard,
        breaker: BreakerConfig::default(),
    }
}

fn small_chunker() -> TextChunker {
    let config = ChunkingConfig {
        chunk_size_tokens: 25,
        overlap_tokens: 0,
        min_chunk_tokens: 1,
        tokenizer: TokenizerMode::Approximate,
        sentence_mode: SentenceMode::Basic,
    };
    let counter = build_token_counter(TokenizerMode::Approximate).expect("token counter");
    TextChunker::new(&config, counter)
}

fn pipeline() -> (Arc<CharEmbedder>, Arc<MemoryStore>, Ingestor, Retriever) {
    let embedder = Arc::new(CharEmbedder::new());
    let store = Arc::new(MemoryStore::default());
    let resilience = fast_resilience();
    let cache = CacheConfig {
        enabled: true,
        capacity: 16,
        ttl_secs: 60,
        sweep_interval_secs: 60,
    };

    let ingestor = Ingestor::new(
        small_chunker(),
        embedder.clone(),
        store.clone(),
        &resilience,
    );
    let retriever = Retriever::new(embedder.clone(), store.clone(), &resilience, &cache);

    (embedder, store, ingestor, retriever)
}

#[tokio::test]
async fn ingest_then_retrieve_returns_the_matching_chunk_first() {
    let (_embedder, _store, ingestor, retriever) = pipeline();

    let doc_two = "bravo delta echo foxtrot golf";
    ingestor
        .ingest("alpha alpha alpha", "doc-1", "one.txt", false)
        .await
        .expect("ingest doc-1");
    ingestor
        .ingest(doc_two, "doc-2", "two.txt", false)
        .await
        .expect("ingest doc-2");
    ingestor
        .ingest(
            "a much longer third document about entirely different things",
            "doc-3",
            "three.txt",
            false,
        )
        .await
        .expect("ingest doc-3");

    // An exact-content query embeds to the same vector as its chunk.
    let results = retriever.retrieve(doc_two, 3).await.expect("retrieve");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].chunk.source_id, "doc-2");
    assert!(results[0].score > 0.999);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(retriever.degraded_count(), 0);
}

#[tokio::test]
async fn invalid_arguments_are_rejected_not_degraded() {
    let (_embedder, _store, _ingestor, retriever) = pipeline();

    let err = retriever.retrieve("   ", 3).await.unwrap_err();
    assert_eq!(err, RetrieveError::EmptyQuery);

    let err = retriever.retrieve("query", 0).await.unwrap_err();
    assert_eq!(err, RetrieveError::ZeroTopK);

    assert_eq!(retriever.degraded_count(), 0);
}

#[tokio::test]
async fn reingesting_the_same_source_does_not_duplicate() {
    let (_embedder, store, ingestor, _retriever) = pipeline();

    let content = "some stable document body";
    let first = ingestor
        .ingest(content, "doc-same", "same.txt", false)
        .await
        .expect("first ingest");
    let count_after_first = store.total();

    let second = ingestor
        .ingest(content, "doc-same", "same.txt", false)
        .await
        .expect("second ingest");

    assert_eq!(first.status, IngestionStatus::Completed);
    assert_eq!(second.status, IngestionStatus::Completed);
    // Chunk ids are deterministic, so the upsert overwrites in place.
    assert_eq!(store.total(), count_after_first);
}

#[tokio::test]
async fn update_removes_chunks_the_new_version_no_longer_has() {
    let (_embedder, store, ingestor, _retriever) = pipeline();

    let long = "\
p1word0 p1word1 p1word2 p1word3 p1word4 p1word5 p1word6 p1word7\n\n\
p2word0 p2word1 p2word2 p2word3 p2word4 p2word5 p2word6 p2word7\n\n\
p3word0 p3word1 p3word2 p3word3 p3word4 p3word5 p3word6 p3word7";

    let record = ingestor
        .ingest(long, "doc-upd", "upd.txt", false)
        .await
        .expect("initial ingest");
    assert!(record.chunk_count > 1, "document should split into chunks");

    let updated = ingestor
        .ingest("now just one line", "doc-upd", "upd.txt", true)
        .await
        .expect("update ingest");

    assert_eq!(updated.status, IngestionStatus::Completed);
    assert_eq!(updated.chunk_count, 1);
    assert_eq!(store.count_for("doc-upd"), 1);
}

#[tokio::test]
async fn store_outage_degrades_retrieval_to_empty() {
    let (embedder, store, ingestor, retriever) = pipeline();

    ingestor
        .ingest("indexed before the outage", "doc-out", "out.txt", false)
        .await
        .expect("ingest");

    store.set_unavailable(true);
    let calls_before = embedder.calls();

    let results = retriever
        .retrieve("query during outage", 5)
        .await
        .expect("degraded retrieve is still Ok");

    assert!(results.is_empty());
    assert_eq!(retriever.degraded_count(), 1);
    // The query was embedded; only the search leg failed.
    assert!(embedder.calls() > calls_before);
}

#[tokio::test]
async fn embedder_outage_produces_a_failed_record_and_writes_nothing() {
    let (embedder, store, ingestor, _retriever) = pipeline();

    embedder.set_unavailable(true);

    let record = ingestor
        .ingest("content that cannot be embedded", "doc-fail", "fail.txt", false)
        .await
        .expect("failures become records, not errors");

    assert_eq!(record.status, IngestionStatus::Failed);
    assert!(record.error_message.is_some());
    assert_eq!(store.total(), 0);
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let (embedder, _store, ingestor, retriever) = pipeline();

    ingestor
        .ingest("cacheable content body", "doc-c", "c.txt", false)
        .await
        .expect("ingest");

    let first = retriever
        .retrieve("cacheable content body", 2)
        .await
        .expect("first retrieve");
    let calls_after_first = embedder.calls();

    let second = retriever
        .retrieve("cacheable content body", 2)
        .await
        .expect("second retrieve");

    assert_eq!(embedder.calls(), calls_after_first);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.chunk.chunk_id, b.chunk.chunk_id);
        assert_eq!(a.score, b.score);
    }
}

#[tokio::test]
async fn deleting_an_unknown_source_is_a_noop() {
    let (_embedder, store, ingestor, _retriever) = pipeline();

    ingestor
        .ingest("kept document", "doc-keep", "keep.txt", false)
        .await
        .expect("ingest");
    let before = store.total();

    store
        .delete_by_source_id("ghost")
        .await
        .expect("deleting nothing succeeds");
    assert_eq!(store.total(), before);

    store
        .delete_by_source_id("doc-keep")
        .await
        .expect("delete real source");
    assert_eq!(store.count_for("doc-keep"), 0);
}

#[tokio::test]
async fn clear_empties_the_store_and_retrieval_finds_nothing() {
    let (_embedder, store, ingestor, retriever) = pipeline();

    ingestor
        .ingest("soon to be cleared", "doc-clear", "clear.txt", false)
        .await
        .expect("ingest");
    assert!(store.total() > 0);

    store.clear().await.expect("clear");
    assert_eq!(store.count_chunks().await.expect("count"), 0);

    let results = retriever
        .retrieve("anything at all", 5)
        .await
        .expect("retrieve after clear");
    assert!(results.is_empty());
    // Empty because the index is empty, not because something was down.
    assert_eq!(retriever.degraded_count(), 0);
}
