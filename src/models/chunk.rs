use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One retrievable slice of a source document.
///
/// `vector` is empty until the embedding step fills it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
    pub source_id: String,
    pub source_name: String,
    pub indexed_at: String,
}

impl Chunk {
    /// Chunk ids are a pure function of source id and position, so
    /// re-ingesting the same source overwrites instead of duplicating.
    pub fn generate_id(source_id: &str, chunk_index: usize) -> String {
        format!("{}-chunk-{}", source_id, chunk_index)
    }

    pub fn new(content: String, chunk_index: usize, source_id: &str, source_name: &str) -> Self {
        Self {
            chunk_id: Self::generate_id(source_id, chunk_index),
            chunk_index,
            content,
            vector: Vec::new(),
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            indexed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Stable UUID for backends that require UUID point ids.
    pub fn point_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.chunk_id.as_bytes())
    }

    /// Move the chunk to a new position, regenerating its id.
    pub fn renumber(&mut self, chunk_index: usize) {
        self.chunk_index = chunk_index;
        self.chunk_id = Self::generate_id(&self.source_id, chunk_index);
    }
}

/// A chunk paired with its similarity score. Higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        assert_eq!(Chunk::generate_id("doc-1", 0), "doc-1-chunk-0");
        assert_eq!(Chunk::generate_id("doc-1", 12), "doc-1-chunk-12");
    }

    #[test]
    fn test_point_id_deterministic() {
        let a = Chunk::new("text".to_string(), 3, "src", "name");
        let b = Chunk::new("other text".to_string(), 3, "src", "name");
        // The point id depends only on the chunk id.
        assert_eq!(a.point_id(), b.point_id());

        let c = Chunk::new("text".to_string(), 4, "src", "name");
        assert_ne!(a.point_id(), c.point_id());
    }

    #[test]
    fn test_renumber_regenerates_id() {
        let mut chunk = Chunk::new("text".to_string(), 5, "src", "name");
        chunk.renumber(2);
        assert_eq!(chunk.chunk_index, 2);
        assert_eq!(chunk.chunk_id, "src-chunk-2");
    }
}
