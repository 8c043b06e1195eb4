//! PostgreSQL + pgvector backend implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{VectorStore, WRITE_BATCH_SIZE, validate_search_args};
use crate::error::VectorStoreError;
use crate::models::{Chunk, SearchResult, SimilarityMetric, VectorStoreConfig};

const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgreSQL vector store backend.
///
/// The table and its HNSW index are created lazily on first write or search.
pub struct PgVectorBackend {
    pool: PgPool,
    table: String,
    dimension: u64,
    metric: SimilarityMetric,
    init: Mutex<bool>,
}

impl PgVectorBackend {
    /// Connect and verify the pgvector extension is installed.
    pub async fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres_max_connections)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect(&config.database_url())
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        let backend = Self {
            pool,
            table: config.postgres_table.clone(),
            dimension: config.dimension as u64,
            metric: config.metric,
            init: Mutex::new(false),
        };

        backend.check_pgvector_extension().await?;

        Ok(backend)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::Init(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn table_exists(&self) -> Result<bool, VectorStoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT table_name FROM information_schema.tables WHERE table_name = $1",
        )
        .bind(&self.table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        Ok(row.is_some())
    }

    /// Create the table and indexes once. The lock keeps concurrent first
    /// callers from racing the DDL.
    async fn ensure_table(&self) -> Result<(), VectorStoreError> {
        let mut initialized = self.init.lock().await;
        if *initialized {
            return Ok(());
        }

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                chunk_id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                indexed_at TEXT NOT NULL
            )
            "#,
            self.table, self.dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Init(e.to_string()))?;

        let indices = [
            format!(
                "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding {})",
                self.table,
                self.table,
                metric_ops(self.metric)
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_source_id_idx ON {} (source_id)",
                self.table, self.table
            ),
        ];

        for index_sql in &indices {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Init(e.to_string()))?;
        }

        *initialized = true;
        Ok(())
    }
}

/// Index operator class for the configured metric.
fn metric_ops(metric: SimilarityMetric) -> &'static str {
    match metric {
        SimilarityMetric::Cosine => "vector_cosine_ops",
        SimilarityMetric::Dot => "vector_ip_ops",
        SimilarityMetric::Euclid => "vector_l2_ops",
    }
}

/// Distance operator for the configured metric.
fn metric_operator(metric: SimilarityMetric) -> &'static str {
    match metric {
        SimilarityMetric::Cosine => "<=>",
        SimilarityMetric::Dot => "<#>",
        SimilarityMetric::Euclid => "<->",
    }
}

/// Map a pgvector distance to a higher-is-better similarity score.
///
/// Cosine distance spans [0, 2]; `<#>` returns the negated inner product;
/// Euclidean distance is unbounded, squashed into (0, 1].
fn similarity_from_distance(metric: SimilarityMetric, distance: f64) -> f32 {
    let score = match metric {
        SimilarityMetric::Cosine => 1.0 - distance / 2.0,
        SimilarityMetric::Dot => -distance,
        SimilarityMetric::Euclid => 1.0 / (1.0 + distance),
    };
    score as f32
}

#[async_trait]
impl VectorStore for PgVectorBackend {
    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<(), VectorStoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.ensure_table().await?;

        let query = format!(
            r#"
            INSERT INTO {} (chunk_id, source_id, source_name, chunk_index, content, embedding, indexed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (chunk_id) DO UPDATE SET
                source_id = EXCLUDED.source_id,
                source_name = EXCLUDED.source_name,
                chunk_index = EXCLUDED.chunk_index,
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                indexed_at = EXCLUDED.indexed_at
            "#,
            self.table
        );

        for batch in chunks.chunks(WRITE_BATCH_SIZE) {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;

            for chunk in batch {
                let embedding = Vector::from(chunk.vector.clone());

                sqlx::query(&query)
                    .bind(&chunk.chunk_id)
                    .bind(&chunk.source_id)
                    .bind(&chunk.source_name)
                    .bind(chunk.chunk_index as i32)
                    .bind(&chunk.content)
                    .bind(&embedding)
                    .bind(&chunk.indexed_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            }

            tx.commit()
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        validate_search_args(&query_vector, top_k)?;
        self.ensure_table().await?;

        let operator = metric_operator(self.metric);
        let query = format!(
            r#"
            SELECT
                chunk_id,
                source_id,
                source_name,
                chunk_index,
                content,
                indexed_at,
                embedding {op} $1 AS distance
            FROM {table}
            ORDER BY embedding {op} $1
            LIMIT {limit}
            "#,
            op = operator,
            table = self.table,
            limit = top_k
        );

        let embedding = Vector::from(query_vector);
        let rows = sqlx::query(&query)
            .bind(&embedding)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;

        let results = rows
            .into_iter()
            .map(|row: PgRow| {
                let chunk_index: i32 = row.get("chunk_index");
                let distance: f64 = row.get("distance");

                let chunk = Chunk {
                    chunk_id: row.get("chunk_id"),
                    chunk_index: chunk_index.max(0) as usize,
                    content: row.get("content"),
                    vector: Vec::new(),
                    source_id: row.get("source_id"),
                    source_name: row.get("source_name"),
                    indexed_at: row.get("indexed_at"),
                };

                SearchResult {
                    chunk,
                    score: similarity_from_distance(self.metric, distance),
                }
            })
            .collect();

        Ok(results)
    }

    async fn delete_by_source_id(&self, source_id: &str) -> Result<(), VectorStoreError> {
        // Nothing to delete when the table was never created.
        if !self.table_exists().await? {
            return Ok(());
        }

        let query = format!("DELETE FROM {} WHERE source_id = $1", self.table);

        sqlx::query(&query)
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        if !self.table_exists().await? {
            return Ok(());
        }

        let query = format!("TRUNCATE TABLE {}", self.table);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::Connection(e.to_string()))
    }

    async fn count_chunks(&self) -> Result<u64, VectorStoreError> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let query = format!("SELECT COUNT(*) FROM {}", self.table);
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        Ok(row.0.max(0) as u64)
    }

    fn name(&self) -> &'static str {
        "pgvector"
    }
}
