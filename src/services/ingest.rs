//! Ingestion pipeline: chunk, embed, and store one source document.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::{ChunkError, IngestError};
use crate::models::{IngestionRecord, ResilienceConfig};
use crate::resilience::CallGuard;
use crate::services::chunker::TextChunker;
use crate::services::embedding::EmbeddingProvider;
use crate::services::vector_store::VectorStore;

/// Runs a source document through chunking, embedding, and the vector store.
///
/// Dependency failures never bubble up as errors. They come back as a
/// `Failed` record so a bad document or a flaky provider cannot abort a
/// larger ingestion run. Only invalid arguments are an `Err`.
pub struct Ingestor {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    embed_guard: CallGuard,
    store_guard: CallGuard,
}

impl Ingestor {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        resilience: &ResilienceConfig,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            embed_guard: CallGuard::new("embedding", &resilience.embedding, &resilience.breaker),
            store_guard: CallGuard::new("vector-store", &resilience.search, &resilience.breaker),
        }
    }

    /// Ingest one document under a stable source id.
    ///
    /// With `update_existing` set, chunks from a previous ingestion of the
    /// same source are deleted first so a shrinking document leaves no
    /// stale chunks behind.
    pub async fn ingest(
        &self,
        content: &str,
        source_id: &str,
        source_name: &str,
        update_existing: bool,
    ) -> Result<IngestionRecord, IngestError> {
        if source_id.trim().is_empty() {
            return Err(ChunkError::EmptySourceId.into());
        }
        if source_name.trim().is_empty() {
            return Err(ChunkError::EmptySourceName.into());
        }

        let mut chunks = self.chunker.chunk(content, source_id, source_name)?;

        if update_existing {
            let outcome = self
                .store_guard
                .run(|| self.store.delete_by_source_id(source_id))
                .await;
            if let Err(err) = outcome {
                return Ok(self.failed(source_id, source_name, &IngestError::VectorStore(err)));
            }
        }

        if chunks.is_empty() {
            debug!(source_id, "document produced no chunks, nothing to index");
            return Ok(IngestionRecord::completed(source_id, source_name, 0));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = match self
            .embed_guard
            .run(|| self.embedder.embed_many(&texts))
            .await
        {
            Ok(vectors) => vectors,
            Err(err) => {
                return Ok(self.failed(source_id, source_name, &IngestError::Embedding(err)));
            }
        };

        if vectors.len() != chunks.len() {
            let err = IngestError::VectorCountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            };
            return Ok(self.failed(source_id, source_name, &err));
        }

        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.vector = vector;
        }

        let chunk_count = chunks.len();
        let outcome = self
            .store_guard
            .run(|| self.store.add_documents(chunks.clone()))
            .await;
        if let Err(err) = outcome {
            return Ok(self.failed(source_id, source_name, &IngestError::VectorStore(err)));
        }

        info!(source_id, chunk_count, "source indexed");
        Ok(IngestionRecord::completed(source_id, source_name, chunk_count))
    }

    fn failed(&self, source_id: &str, source_name: &str, err: &IngestError) -> IngestionRecord {
        error!(source_id, error = %err, "ingestion failed");
        IngestionRecord::failed(source_id, source_name, 0, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, ErrorKind, VectorStoreError};
    use crate::models::{
        BreakerConfig, Chunk, ChunkingConfig, GuardConfig, IngestionStatus, SearchResult,
        SentenceMode, TokenizerMode,
    };
    use crate::services::tokens::HeuristicCounter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeEmbedder {
        healthy: bool,
        /// Drop one vector from each response to simulate a broken provider.
        short_response: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if !self.healthy {
                return Err(EmbeddingError::Connection("connection refused".to_string()));
            }
            let mut vectors = vec![vec![1.0, 0.0]; texts.len()];
            if self.short_response {
                vectors.pop();
            }
            Ok(vectors)
        }

        fn model_name(&self) -> &str {
            "fake-embedder"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    /// Keyed in-memory store so re-ingestion and deletes are observable.
    struct MemoryStore {
        chunks: Mutex<HashMap<String, Chunk>>,
        fail_writes: bool,
    }

    impl MemoryStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                chunks: Mutex::new(HashMap::new()),
                fail_writes: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                chunks: Mutex::new(HashMap::new()),
                fail_writes: true,
            })
        }

        fn len(&self) -> usize {
            self.chunks.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<(), VectorStoreError> {
            if self.fail_writes {
                return Err(VectorStoreError::Upsert("disk full".to_string()));
            }
            let mut map = self.chunks.lock().unwrap();
            for chunk in chunks {
                map.insert(chunk.chunk_id.clone(), chunk);
            }
            Ok(())
        }

        async fn search(
            &self,
            _query_vector: Vec<f32>,
            _top_k: usize,
        ) -> Result<Vec<SearchResult>, VectorStoreError> {
            Ok(Vec::new())
        }

        async fn delete_by_source_id(&self, source_id: &str) -> Result<(), VectorStoreError> {
            self.chunks
                .lock()
                .unwrap()
                .retain(|_, chunk| chunk.source_id != source_id);
            Ok(())
        }

        async fn clear(&self) -> Result<(), VectorStoreError> {
            self.chunks.lock().unwrap().clear();
            Ok(())
        }

        async fn health_check(&self) -> Result<bool, VectorStoreError> {
            Ok(true)
        }

        async fn count_chunks(&self) -> Result<u64, VectorStoreError> {
            Ok(self.len() as u64)
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    fn small_chunker() -> TextChunker {
        let config = ChunkingConfig {
            chunk_size_tokens: 30,
            overlap_tokens: 0,
            min_chunk_tokens: 1,
            tokenizer: TokenizerMode::Approximate,
            sentence_mode: SentenceMode::Basic,
        };
        TextChunker::new(&config, Arc::new(HeuristicCounter))
    }

    fn ingestor_with(embedder: FakeEmbedder, store: Arc<MemoryStore>) -> Ingestor {
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
        Ingestor::new(small_chunker(), Arc::new(embedder), store, &resilience)
    }

    fn healthy_embedder() -> FakeEmbedder {
        FakeEmbedder {
            healthy: true,
            short_response: false,
        }
    }

    /// Text long enough for several chunks under the 30-token test budget.
    fn long_text() -> String {
        (0..6)
            .map(|p| {
                (0..20)
                    .map(|w| format!("p{p}word{w}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[tokio::test]
    async fn test_blank_source_id_is_an_error() {
        let ingestor = ingestor_with(healthy_embedder(), MemoryStore::new());
        let err = ingestor.ingest("content", "  ", "name", false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_blank_content_completes_with_zero_chunks() {
        let store = MemoryStore::new();
        let ingestor = ingestor_with(healthy_embedder(), store.clone());

        let record = ingestor.ingest("   \n", "doc-1", "doc.md", false).await.unwrap();
        assert_eq!(record.status, IngestionStatus::Completed);
        assert_eq!(record.chunk_count, 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_ingest_attaches_vectors_and_writes() {
        let store = MemoryStore::new();
        let ingestor = ingestor_with(healthy_embedder(), store.clone());

        let record = ingestor
            .ingest(&long_text(), "doc-1", "doc.md", false)
            .await
            .unwrap();

        assert_eq!(record.status, IngestionStatus::Completed);
        assert!(record.chunk_count > 1);
        assert_eq!(store.len(), record.chunk_count);
        for chunk in store.chunks.lock().unwrap().values() {
            assert_eq!(chunk.vector.len(), 2);
            assert_eq!(chunk.source_id, "doc-1");
        }
    }

    #[tokio::test]
    async fn test_reingest_overwrites_instead_of_duplicating() {
        let store = MemoryStore::new();
        let ingestor = ingestor_with(healthy_embedder(), store.clone());
        let text = long_text();

        let first = ingestor.ingest(&text, "doc-1", "doc.md", false).await.unwrap();
        let second = ingestor.ingest(&text, "doc-1", "doc.md", true).await.unwrap();

        assert_eq!(first.chunk_count, second.chunk_count);
        assert_eq!(store.len(), first.chunk_count);
    }

    #[tokio::test]
    async fn test_update_existing_removes_stale_chunks() {
        let store = MemoryStore::new();
        let ingestor = ingestor_with(healthy_embedder(), store.clone());

        ingestor
            .ingest(&long_text(), "doc-1", "doc.md", false)
            .await
            .unwrap();
        assert!(store.len() > 1);

        // The document shrank to a single chunk.
        let record = ingestor
            .ingest("one short line", "doc-1", "doc.md", true)
            .await
            .unwrap();
        assert_eq!(record.chunk_count, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_outage_yields_failed_record() {
        let store = MemoryStore::new();
        let embedder = FakeEmbedder {
            healthy: false,
            short_response: false,
        };
        let ingestor = ingestor_with(embedder, store.clone());

        let record = ingestor
            .ingest("some content", "doc-1", "doc.md", false)
            .await
            .unwrap();

        assert_eq!(record.status, IngestionStatus::Failed);
        assert!(record.error_message.is_some());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_yields_failed_record() {
        let store = MemoryStore::new();
        let embedder = FakeEmbedder {
            healthy: true,
            short_response: true,
        };
        let ingestor = ingestor_with(embedder, store.clone());

        let record = ingestor
            .ingest(&long_text(), "doc-1", "doc.md", false)
            .await
            .unwrap();

        assert_eq!(record.status, IngestionStatus::Failed);
        assert!(record.error_message.unwrap().contains("vectors for"));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_store_outage_yields_failed_record() {
        let store = MemoryStore::failing();
        let ingestor = ingestor_with(healthy_embedder(), store);

        let record = ingestor
            .ingest("some content", "doc-1", "doc.md", false)
            .await
            .unwrap();

        assert_eq!(record.status, IngestionStatus::Failed);
        assert_eq!(record.chunk_count, 0);
    }
}
