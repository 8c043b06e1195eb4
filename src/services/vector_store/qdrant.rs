//! Qdrant vector store backend implementation.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{VectorStore, WRITE_BATCH_SIZE, validate_search_args};
use crate::error::VectorStoreError;
use crate::models::{Chunk, SearchResult, SimilarityMetric, VectorStoreConfig};

/// Qdrant vector store backend.
///
/// The collection is created lazily on first write or search so that a fresh
/// deployment needs no separate setup step.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimension: u64,
    metric: SimilarityMetric,
    init: Mutex<bool>,
}

impl QdrantBackend {
    /// Create a new Qdrant backend from configuration.
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = config.qdrant_api_key() {
            builder = builder.api_key(api_key);
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: config.dimension as u64,
            metric: config.metric,
            init: Mutex::new(false),
        })
    }

    /// Points in the collection, or None when it does not exist.
    async fn collection_points(&self) -> Result<Option<u64>, VectorStoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => Ok(Some(
                info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
            )),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("doesn't exist") {
                    Ok(None)
                } else {
                    Err(VectorStoreError::Connection(msg))
                }
            }
        }
    }

    /// Create the collection once. The lock keeps concurrent first callers
    /// from racing the create.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let mut initialized = self.init.lock().await;
        if *initialized {
            return Ok(());
        }

        if self.collection_points().await?.is_none() {
            let create = CreateCollectionBuilder::new(&self.collection).vectors_config(
                VectorParamsBuilder::new(self.dimension, distance_for(self.metric)),
            );

            self.client
                .create_collection(create)
                .await
                .map_err(|e| VectorStoreError::Init(e.to_string()))?;
        }

        *initialized = true;
        Ok(())
    }

    fn chunk_to_point(chunk: &Chunk) -> PointStruct {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("chunk_id".to_string(), chunk.chunk_id.clone().into());
        payload.insert("source_id".to_string(), chunk.source_id.clone().into());
        payload.insert("source_name".to_string(), chunk.source_name.clone().into());
        payload.insert(
            "chunk_index".to_string(),
            (chunk.chunk_index as i64).into(),
        );
        payload.insert("content".to_string(), chunk.content.clone().into());
        payload.insert("indexed_at".to_string(), chunk.indexed_at.clone().into());

        PointStruct::new(
            chunk.point_id().to_string(),
            chunk.vector.clone(),
            payload,
        )
    }
}

fn distance_for(metric: SimilarityMetric) -> Distance {
    match metric {
        SimilarityMetric::Cosine => Distance::Cosine,
        SimilarityMetric::Dot => Distance::Dot,
        SimilarityMetric::Euclid => Distance::Euclid,
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn payload_index(payload: &HashMap<String, Value>, key: &str) -> usize {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => usize::try_from(*n).unwrap_or(0),
        _ => 0,
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn add_documents(&self, chunks: Vec<Chunk>) -> Result<(), VectorStoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.ensure_collection().await?;

        for batch in chunks.chunks(WRITE_BATCH_SIZE) {
            let points: Vec<PointStruct> = batch.iter().map(Self::chunk_to_point).collect();
            let upsert = UpsertPointsBuilder::new(&self.collection, points);

            self.client
                .upsert_points(upsert)
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
        self.ensure_collection().await?;

        let search =
            SearchPointsBuilder::new(&self.collection, query_vector, top_k as u64)
                .with_payload(true);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::Search(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload;
                let chunk = Chunk {
                    chunk_id: payload_str(&payload, "chunk_id"),
                    chunk_index: payload_index(&payload, "chunk_index"),
                    content: payload_str(&payload, "content"),
                    vector: Vec::new(),
                    source_id: payload_str(&payload, "source_id"),
                    source_name: payload_str(&payload, "source_name"),
                    indexed_at: payload_str(&payload, "indexed_at"),
                };

                SearchResult {
                    chunk,
                    score: point.score,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn delete_by_source_id(&self, source_id: &str) -> Result<(), VectorStoreError> {
        // Nothing to delete when the collection was never created.
        if self.collection_points().await?.is_none() {
            return Ok(());
        }

        let filter = Filter::must([Condition::matches("source_id", source_id.to_string())]);
        let delete = DeletePointsBuilder::new(&self.collection).points(filter);

        self.client
            .delete_points(delete)
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        if self.collection_points().await?.is_none() {
            return Ok(());
        }

        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;

        // The next write or search recreates the collection.
        *self.init.lock().await = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::Connection(e.to_string()))
    }

    async fn count_chunks(&self) -> Result<u64, VectorStoreError> {
        Ok(self.collection_points().await?.unwrap_or(0))
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_mapping() {
        assert_eq!(distance_for(SimilarityMetric::Cosine), Distance::Cosine);
        assert_eq!(distance_for(SimilarityMetric::Dot), Distance::Dot);
        assert_eq!(distance_for(SimilarityMetric::Euclid), Distance::Euclid);
    }

    #[test]
    fn test_point_payload_roundtrip() {
        let mut chunk = Chunk::new("some content".to_string(), 3, "doc-9", "notes.md");
        chunk.vector = vec![0.1, 0.2];
        let point = QdrantBackend::chunk_to_point(&chunk);

        let payload = point.payload;
        assert_eq!(payload_str(&payload, "chunk_id"), "doc-9-chunk-3");
        assert_eq!(payload_str(&payload, "source_id"), "doc-9");
        assert_eq!(payload_str(&payload, "source_name"), "notes.md");
        assert_eq!(payload_str(&payload, "content"), "some content");
        assert_eq!(payload_index(&payload, "chunk_index"), 3);
    }

    #[test]
    fn test_missing_payload_fields_default() {
        let payload: HashMap<String, Value> = HashMap::new();
        assert_eq!(payload_str(&payload, "chunk_id"), "");
        assert_eq!(payload_index(&payload, "chunk_index"), 0);
    }
}
