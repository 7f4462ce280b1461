//! In-memory vector index.
//!
//! Brute-force cosine scoring over a point map. Used by tests and for local
//! development without a Qdrant instance; semantics mirror the Qdrant
//! backend (idempotent upsert by id, city-filtered search and deletion).

use crate::vector::{IndexHealth, IndexedPoint, SearchHit, VectorIndex};
use civica_core::AppResult;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryIndex {
    points: RwLock<HashMap<String, IndexedPoint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points, optionally restricted to one `(city, uri)`.
    pub fn point_count(&self, filter: Option<(&str, &str)>) -> usize {
        let points = self.points.read().expect("index lock poisoned");
        match filter {
            Some((city_id, uri)) => points
                .values()
                .filter(|p| p.payload.city_id == city_id && p.payload.uri == uri)
                .count(),
            None => points.len(),
        }
    }

    /// Stored point ids, sorted, for idempotence checks.
    pub fn point_ids(&self) -> Vec<String> {
        let points = self.points.read().expect("index lock poisoned");
        let mut ids: Vec<String> = points.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Cosine similarity between two vectors; 0.0 on dimension mismatch or
/// zero-norm input.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self) -> AppResult<()> {
        Ok(())
    }

    async fn search(
        &self,
        city_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        let points = self.points.read().expect("index lock poisoned");

        let mut hits: Vec<SearchHit> = points
            .values()
            .filter(|p| p.payload.city_id == city_id)
            .map(|p| SearchHit {
                score: cosine_similarity(query_vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn upsert(&self, new_points: &[IndexedPoint]) -> AppResult<()> {
        let mut points = self.points.write().expect("index lock poisoned");
        for point in new_points {
            points.insert(point.id.clone(), point.clone());
        }
        Ok(())
    }

    async fn delete_where(&self, city_id: &str, uri: &str) -> AppResult<()> {
        let mut points = self.points.write().expect("index lock poisoned");
        points.retain(|_, p| !(p.payload.city_id == city_id && p.payload.uri == uri));
        Ok(())
    }

    async fn health(&self) -> IndexHealth {
        IndexHealth {
            status: "ready".to_string(),
            points_count: Some(self.point_count(None) as u64),
            error: None,
        }
    }
}
