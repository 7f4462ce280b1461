//! Vector index abstraction.
//!
//! The index stores per-city chunk vectors with a payload and supports
//! city-filtered similarity search, batch upsert, and filtered deletion.
//! The sync engine is the only writer.

pub mod memory;
pub mod qdrant;

use civica_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

/// Payload stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPayload {
    /// City the chunk belongs to (exact-match filter key)
    pub city_id: String,

    /// Deterministic document identifier, derived from the uri
    pub doc_id: String,

    /// Document-scoped chunk identifier (`<uri>#<index>`)
    pub chunk_id: String,

    /// Overlap-window sequence number within the document
    pub chunk_index: u32,

    /// Source URI (second filter key for deletions)
    pub uri: String,

    /// Title of the source document
    pub title: String,

    /// Chunk text
    pub text: String,

    /// Content hash of the source document at ingestion time
    pub content_hash: String,

    /// RFC3339 timestamp of the ingestion run
    pub updated_at: String,
}

/// A vector plus payload, keyed by a deterministic point id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPoint {
    /// Deterministic id derived from `(city_id, uri, chunk_index)`
    pub id: String,

    /// Embedding vector
    pub vector: Vec<f32>,

    /// Payload metadata
    pub payload: PointPayload,
}

/// One ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Similarity score
    pub score: f32,

    /// Stored payload
    pub payload: PointPayload,
}

/// Best-effort index reachability report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHealth {
    /// "ready" or "unavailable"
    pub status: String,

    /// Total points in the collection, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_count: Option<u64>,

    /// Error description when unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Trait for vector index backends.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(&self) -> AppResult<()>;

    /// Search for the top-k most similar points within one city.
    ///
    /// Returns hits ordered by descending similarity score.
    async fn search(
        &self,
        city_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>>;

    /// Insert or replace points by id.
    async fn upsert(&self, points: &[IndexedPoint]) -> AppResult<()>;

    /// Delete every point matching `(city_id, uri)`.
    async fn delete_where(&self, city_id: &str, uri: &str) -> AppResult<()>;

    /// Probe index reachability. Never fails; problems are reported inline.
    async fn health(&self) -> IndexHealth;
}

/// Configuration for creating a vector index backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Backend name ("qdrant" or "memory")
    pub backend: String,

    /// Qdrant HTTP endpoint
    pub url: String,

    /// Collection name
    pub collection: String,

    /// Vector dimension
    pub vector_size: usize,
}

/// Create a vector index backend based on configuration.
pub fn create_index(config: &IndexConfig) -> AppResult<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantIndex::new(
            &config.url,
            &config.collection,
            config.vector_size,
        )?)),
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        _ => Err(AppError::Index(format!(
            "Unknown vector index backend: '{}'. Supported backends: qdrant, memory",
            config.backend
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_index() {
        let config = IndexConfig {
            backend: "memory".to_string(),
            url: String::new(),
            collection: "test".to_string(),
            vector_size: 3,
        };
        assert!(create_index(&config).is_ok());
    }

    #[test]
    fn test_create_unknown_backend() {
        let config = IndexConfig {
            backend: "faiss".to_string(),
            url: String::new(),
            collection: "test".to_string(),
            vector_size: 3,
        };
        assert!(create_index(&config).is_err());
    }
}
