use serde::{Deserialize, Serialize};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Completed,
    Failed,
}

/// What happened when a source was ingested.
///
/// Failed runs carry a message instead of panicking the caller; a source
/// can always be re-ingested under the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub source_id: String,
    pub source_name: String,
    pub chunk_count: usize,
    pub status: IngestionStatus,
    pub completed_at: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl IngestionRecord {
    pub fn completed(source_id: &str, source_name: &str, chunk_count: usize) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            chunk_count,
            status: IngestionStatus::Completed,
            completed_at: chrono::Utc::now().to_rfc3339(),
            error_message: None,
        }
    }

    pub fn failed(source_id: &str, source_name: &str, chunk_count: usize, message: String) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            chunk_count,
            status: IngestionStatus::Failed,
            completed_at: chrono::Utc::now().to_rfc3339(),
            error_message: Some(message),
        }
    }
}
