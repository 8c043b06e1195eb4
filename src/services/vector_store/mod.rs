//! Vector store abstraction layer.
//!
//! This module provides a trait-based abstraction over different vector store
//! backends (Qdrant, PostgreSQL/pgvector) allowing switching based on
//! configuration. The backend is chosen once at process start.

mod pgvector;
mod qdrant;

pub use pgvector::PgVectorBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::VectorStoreError;
use crate::models::{Chunk, SearchResult, VectorBackend, VectorStoreConfig};

/// Upserts are split into batches of this many points.
pub const WRITE_BATCH_SIZE: usize = 100;

/// Abstract trait for vector store operations.
///
/// All backends must implement this trait so the rest of the application can
/// stay backend-agnostic. Write operations are idempotent, keyed by chunk id.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or update chunks with their embeddings.
    ///
    /// Writes happen in batches of [`WRITE_BATCH_SIZE`]. Chunks must carry
    /// their vectors; the first call creates the collection or table.
    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<(), VectorStoreError>;

    /// Search for the `top_k` nearest chunks, highest similarity first.
    async fn search(
        &self,
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError>;

    /// Delete every chunk belonging to a source. No-op when nothing matches.
    async fn delete_by_source_id(&self, source_id: &str) -> Result<(), VectorStoreError>;

    /// Remove every stored chunk. No-op when the collection does not exist.
    async fn clear(&self) -> Result<(), VectorStoreError>;

    /// Check if the store is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Number of stored chunks. Zero when the collection does not exist yet.
    async fn count_chunks(&self) -> Result<u64, VectorStoreError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Reject search arguments both backends must refuse.
fn validate_search_args(query_vector: &[f32], top_k: usize) -> Result<(), VectorStoreError> {
    if query_vector.is_empty() {
        return Err(VectorStoreError::InvalidArgument(
            "query vector is empty".to_string(),
        ));
    }
    if top_k == 0 {
        return Err(VectorStoreError::InvalidArgument(
            "top_k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Create a vector store backend based on configuration.
///
/// This is the main factory function that returns the appropriate backend
/// implementation based on the configured `VectorBackend`.
pub async fn create_backend(
    config: &VectorStoreConfig,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.backend {
        VectorBackend::Qdrant => {
            let backend = QdrantBackend::new(config)?;
            Ok(Arc::new(backend))
        }
        VectorBackend::Postgres => {
            let backend = PgVectorBackend::new(config).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_empty_vector_rejected() {
        let err = validate_search_args(&[], 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let err = validate_search_args(&[0.1, 0.2], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_valid_args_accepted() {
        assert!(validate_search_args(&[0.1, 0.2], 5).is_ok());
    }
}
