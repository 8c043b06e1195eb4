use serde::{Deserialize, Serialize};

use super::search::OutputFormat;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8100";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "ragstore";
pub const DEFAULT_POSTGRES_URL: &str = "postgres://localhost:5432/ragstore";

/// Environment variable overriding the Postgres connection string.
/// Credentials belong in the environment, never in the config file.
pub const DATABASE_URL_ENV: &str = "RAGSTORE_DATABASE_URL";
/// Environment variable holding the Qdrant API key, if the deployment needs one.
pub const QDRANT_API_KEY_ENV: &str = "RAGSTORE_QDRANT_API_KEY";

/// Which vector store backend the process talks to.
///
/// Chosen once at startup by the factory; never switched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Qdrant,
    Postgres,
}

impl std::fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorBackend::Qdrant => write!(f, "qdrant"),
            VectorBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// Similarity metric used by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimilarityMetric::Cosine => write!(f, "cosine"),
            SimilarityMetric::Dot => write!(f, "dot"),
            SimilarityMetric::Euclid => write!(f, "euclid"),
        }
    }
}

/// Token counting strategy for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerMode {
    /// ceil(bytes / 4), no dependency on a real vocabulary.
    Approximate,
    /// cl100k BPE, the encoding used by common embedding models.
    #[default]
    Cl100k,
}

/// How aggressively the chunker detects sentence boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SentenceMode {
    /// Split on `.`, `!`, `?` followed by whitespace.
    Basic,
    /// Additionally skip known abbreviations and require the next sentence
    /// to start with an uppercase letter.
    #[default]
    Improved,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn config_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join("ragstore").join("config.toml"))
    }

    pub fn load() -> Result<Self, crate::error::ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<(), crate::error::ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            crate::error::ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Cross-field checks, run once at startup so misconfiguration fails
    /// loudly instead of surfacing as odd behavior mid-pipeline.
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError::ValidationError;

        if self.chunking.chunk_size_tokens == 0 {
            return Err(ValidationError(
                "chunking.chunk_size_tokens must be greater than zero".to_string(),
            ));
        }
        if self.chunking.overlap_tokens >= self.chunking.chunk_size_tokens {
            return Err(ValidationError(format!(
                "chunking.overlap_tokens ({}) must be smaller than chunk_size_tokens ({})",
                self.chunking.overlap_tokens, self.chunking.chunk_size_tokens
            )));
        }
        if self.chunking.min_chunk_tokens > self.chunking.chunk_size_tokens {
            return Err(ValidationError(format!(
                "chunking.min_chunk_tokens ({}) cannot exceed chunk_size_tokens ({})",
                self.chunking.min_chunk_tokens, self.chunking.chunk_size_tokens
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(ValidationError(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimension != self.vector_store.dimension {
            return Err(ValidationError(format!(
                "embedding.dimension ({}) does not match vector_store.dimension ({})",
                self.embedding.dimension, self.vector_store.dimension
            )));
        }
        if self.cache.capacity == 0 {
            return Err(ValidationError(
                "cache.capacity must be greater than zero".to_string(),
            ));
        }
        if self.search.default_limit == 0 {
            return Err(ValidationError(
                "search.default_limit must be greater than zero".to_string(),
            ));
        }
        // The table name is interpolated into DDL, so it must stay a plain
        // identifier rather than arbitrary text.
        if !is_sql_identifier(&self.vector_store.postgres_table) {
            return Err(ValidationError(format!(
                "vector_store.postgres_table ({:?}) must be a plain SQL identifier",
                self.vector_store.postgres_table
            )));
        }
        self.resilience.validate()?;
        Ok(())
    }
}

fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size_tokens")]
    pub chunk_size_tokens: usize,

    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,

    #[serde(default = "default_min_chunk_tokens")]
    pub min_chunk_tokens: usize,

    #[serde(default)]
    pub tokenizer: TokenizerMode,

    #[serde(default)]
    pub sentence_mode: SentenceMode,
}

fn default_chunk_size_tokens() -> usize {
    800
}

fn default_overlap_tokens() -> usize {
    100
}

fn default_min_chunk_tokens() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size_tokens(),
            overlap_tokens: default_overlap_tokens(),
            min_chunk_tokens: default_min_chunk_tokens(),
            tokenizer: TokenizerMode::default(),
            sentence_mode: SentenceMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    #[serde(default)]
    pub metric: SimilarityMetric,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_postgres_url")]
    pub postgres_url: String,

    #[serde(default = "default_postgres_table")]
    pub postgres_table: String,

    #[serde(default = "default_postgres_max_connections")]
    pub postgres_max_connections: u32,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_postgres_url() -> String {
    DEFAULT_POSTGRES_URL.to_string()
}

fn default_postgres_table() -> String {
    "chunks".to_string()
}

fn default_postgres_max_connections() -> u32 {
    5
}

impl VectorStoreConfig {
    /// API key from the environment. Never read from the config file.
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(QDRANT_API_KEY_ENV)
            .ok()
            .filter(|v| !v.is_empty())
    }

    /// Connection string, with the environment taking precedence so that
    /// credentials stay out of the config file.
    pub fn database_url(&self) -> String {
        std::env::var(DATABASE_URL_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.postgres_url.clone())
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            metric: SimilarityMetric::default(),
            dimension: default_dimension(),
            url: default_qdrant_url(),
            collection: default_collection(),
            postgres_url: default_postgres_url(),
            postgres_table: default_postgres_table(),
            postgres_max_connections: default_postgres_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    100
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Retry, timeout, and breaker budgets.
///
/// The two dependencies get distinct budgets: queries should fail fast so
/// the caller can degrade, ingestion can afford to wait out a slow provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "GuardConfig::embedding_defaults")]
    pub embedding: GuardConfig,

    #[serde(default = "GuardConfig::search_defaults")]
    pub search: GuardConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            embedding: GuardConfig::embedding_defaults(),
            search: GuardConfig::search_defaults(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl ResilienceConfig {
    fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError::ValidationError;

        for (name, guard) in [("embedding", &self.embedding), ("search", &self.search)] {
            if guard.timeout_ms == 0 {
                return Err(ValidationError(format!(
                    "resilience.{name}.timeout_ms must be greater than zero"
                )));
            }
        }
        if !(self.breaker.failure_rate > 0.0 && self.breaker.failure_rate <= 1.0) {
            return Err(ValidationError(format!(
                "resilience.breaker.failure_rate ({}) must be within (0, 1]",
                self.breaker.failure_rate
            )));
        }
        if self.breaker.min_samples == 0 {
            return Err(ValidationError(
                "resilience.breaker.min_samples must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl GuardConfig {
    pub fn embedding_defaults() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }

    pub fn search_defaults() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::embedding_defaults()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_rate() -> f64 {
    0.5
}

fn default_min_samples() -> usize {
    5
}

fn default_window_secs() -> u64 {
    30
}

fn default_cooldown_secs() -> u64 {
    15
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate: default_failure_rate(),
            min_samples: default_min_samples(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
        "**/dist/**".to_string(),
        "**/build/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
        "**/vendor/**".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default)]
    pub default_format: OutputFormat,

    // toml cannot serialize a bare None, so absent means unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_min_score: Option<f32>,
}

fn default_limit() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_format: OutputFormat::Text,
            default_min_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            retention_days: default_retention_days(),
        }
    }
}
