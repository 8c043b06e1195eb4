//! Error types for the retrieval engine.

use std::time::Duration;

use thiserror::Error;

use crate::resilience::GuardedError;
use crate::resilience::retry::Retryable;

/// Broad classification shared by the domain errors.
///
/// The retry layer and the retrieval orchestrator branch on kinds rather
/// than on message text: `Unavailable` is the only retryable kind, and the
/// only one the orchestrator degrades to empty results for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed something unusable. Never retried.
    InvalidArgument,
    /// An external dependency could not be reached or answered too slowly.
    Unavailable,
    /// A dependency answered with data in an inconsistent shape.
    Integrity,
    /// Anything else.
    Internal,
}

/// Errors from the embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("failed to connect to embedding provider: {0}")]
    Connection(String),

    #[error("embedding provider returned status {status}")]
    Server { status: u16 },

    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding circuit open, retry in {0:?}")]
    CircuitOpen(Duration),
}

impl EmbeddingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbeddingError::EmptyInput => ErrorKind::InvalidArgument,
            EmbeddingError::Connection(_)
            | EmbeddingError::Timeout(_)
            | EmbeddingError::CircuitOpen(_) => ErrorKind::Unavailable,
            // 5xx and throttling are transient; other statuses are not
            EmbeddingError::Server { status } => {
                if *status >= 500 || *status == 429 {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Internal
                }
            }
            EmbeddingError::Request(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Internal
                }
            }
            EmbeddingError::InvalidResponse(_) => ErrorKind::Integrity,
        }
    }
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        // An open circuit already decided the dependency is down; retrying
        // inside the same call would only stall the caller.
        self.kind() == ErrorKind::Unavailable && !matches!(self, EmbeddingError::CircuitOpen(_))
    }
}

impl GuardedError for EmbeddingError {
    fn timed_out(after: Duration) -> Self {
        EmbeddingError::Timeout(after)
    }

    fn circuit_open(retry_after: Duration) -> Self {
        EmbeddingError::CircuitOpen(retry_after)
    }
}

/// Errors from either vector store backend.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to connect to vector store: {0}")]
    Connection(String),

    #[error("store initialization error: {0}")]
    Init(String),

    #[error("upsert error: {0}")]
    Upsert(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("delete error: {0}")]
    Delete(String),

    #[error("vector store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("vector store circuit open, retry in {0:?}")]
    CircuitOpen(Duration),
}

impl VectorStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VectorStoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            // Operation failures against a fixed schema are environment
            // problems in practice, so they count as unavailability.
            VectorStoreError::Connection(_)
            | VectorStoreError::Init(_)
            | VectorStoreError::Upsert(_)
            | VectorStoreError::Search(_)
            | VectorStoreError::Delete(_)
            | VectorStoreError::Timeout(_)
            | VectorStoreError::CircuitOpen(_) => ErrorKind::Unavailable,
        }
    }
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable && !matches!(self, VectorStoreError::CircuitOpen(_))
    }
}

impl GuardedError for VectorStoreError {
    fn timed_out(after: Duration) -> Self {
        VectorStoreError::Timeout(after)
    }

    fn circuit_open(retry_after: Duration) -> Self {
        VectorStoreError::CircuitOpen(retry_after)
    }
}

/// Errors from the chunker.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("source id cannot be empty")]
    EmptySourceId,

    #[error("source name cannot be empty")]
    EmptySourceName,
}

impl ChunkError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// Errors from the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("provider returned {vectors} vectors for {chunks} chunks")]
    VectorCountMismatch { chunks: usize, vectors: usize },
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Chunk(e) => e.kind(),
            IngestError::Embedding(e) => e.kind(),
            IngestError::VectorStore(e) => e.kind(),
            IngestError::VectorCountMismatch { .. } => ErrorKind::Integrity,
        }
    }
}

/// Errors surfaced to retrieval callers.
///
/// Dependency failures never appear here: the orchestrator converts them to
/// an empty result set and a degraded signal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetrieveError {
    #[error("query cannot be empty")]
    EmptyQuery,

    #[error("top_k must be greater than zero")]
    ZeroTopK,
}

impl RetrieveError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("retrieval error: {0}")]
    Retrieve(#[from] RetrieveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_kinds() {
        assert_eq!(EmbeddingError::EmptyInput.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            EmbeddingError::Connection("refused".to_string()).kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            EmbeddingError::Server { status: 503 }.kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            EmbeddingError::Server { status: 429 }.kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            EmbeddingError::Server { status: 400 }.kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            EmbeddingError::InvalidResponse("wrong shape".to_string()).kind(),
            ErrorKind::Integrity
        );
    }

    #[test]
    fn test_circuit_open_is_not_retryable() {
        let err = EmbeddingError::CircuitOpen(Duration::from_secs(5));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(!err.is_retryable());

        let err = VectorStoreError::CircuitOpen(Duration::from_secs(5));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeouts_are_retryable() {
        assert!(EmbeddingError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(VectorStoreError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_invalid_arguments_are_not_retryable() {
        assert!(!EmbeddingError::EmptyInput.is_retryable());
        assert!(
            !VectorStoreError::InvalidArgument("top_k must be greater than zero".to_string())
                .is_retryable()
        );
    }

    #[test]
    fn test_ingest_error_kind_delegation() {
        let err = IngestError::from(ChunkError::EmptySourceId);
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = IngestError::from(EmbeddingError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let err = IngestError::VectorCountMismatch {
            chunks: 4,
            vectors: 3,
        };
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }
}
