pub mod cache;
pub mod chunker;
pub mod embedding;
pub mod ingest;
pub mod metrics;
pub mod retriever;
pub mod tokens;
pub mod vector_store;

pub use cache::ResultCache;
pub use chunker::TextChunker;
pub use embedding::{EmbeddingProvider, HealthResponse, HttpEmbeddingClient};
pub use ingest::Ingestor;
pub use metrics::{MetricsStore, OperationSummary};
pub use retriever::Retriever;
pub use tokens::{TokenCounter, build_token_counter};
pub use vector_store::{VectorStore, WRITE_BATCH_SIZE, create_backend};
