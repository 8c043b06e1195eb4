mod chunk;
mod config;
mod ingestion;
mod search;

pub use chunk::{Chunk, SearchResult};
pub use config::{
    BreakerConfig, CacheConfig, ChunkingConfig, Config, DATABASE_URL_ENV, DEFAULT_COLLECTION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL, DEFAULT_POSTGRES_URL, DEFAULT_QDRANT_URL,
    EmbeddingConfig, GuardConfig, IndexingConfig, MetricsConfig, QDRANT_API_KEY_ENV,
    ResilienceConfig, SearchConfig, SentenceMode, SimilarityMetric, TokenizerMode, VectorBackend,
    VectorStoreConfig,
};
pub use ingestion::{IngestionRecord, IngestionStatus};
pub use search::{OutputFormat, SearchResults};
