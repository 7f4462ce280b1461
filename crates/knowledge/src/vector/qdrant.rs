//! Qdrant-backed vector index.
//!
//! Talks to Qdrant's HTTP API. The collection is created on first use with
//! cosine distance; search and deletion are filtered on the payload's
//! `city_id` (and `uri` for deletion) with exact matches.

use crate::vector::{IndexHealth, IndexedPoint, PointPayload, SearchHit, VectorIndex};
use civica_core::{AppError, AppResult};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Request timeout for index calls, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    vector_size: usize,
}

/// Search response envelope.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<PointPayload>,
}

/// Collection info envelope, used by the health probe.
#[derive(Debug, Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
}

impl QdrantIndex {
    /// Create a new Qdrant index client.
    pub fn new(base_url: &str, collection: &str, vector_size: usize) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                AppError::Index(format!("Failed to create HTTP client for Qdrant: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            vector_size,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn city_filter(city_id: &str, uri: Option<&str>) -> serde_json::Value {
        let mut must = vec![json!({ "key": "city_id", "match": { "value": city_id } })];
        if let Some(uri) = uri {
            must.push(json!({ "key": "uri", "match": { "value": uri } }));
        }
        json!({ "must": must })
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> AppResult<()> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Qdrant unreachable: {}", e)))?;

        if response.status().is_success() {
            return Ok(());
        }

        tracing::info!(collection = %self.collection, "Creating Qdrant collection");

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Qdrant unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Index(format!(
                "Failed to create collection ({}): {}",
                status, body
            )));
        }

        Ok(())
    }

    async fn search(
        &self,
        city_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        let url = format!("{}/points/search", self.collection_url());

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
                "with_vector": false,
                "filter": Self::city_filter(city_id, None),
            }))
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Qdrant search failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Index(format!(
                "Qdrant search failed ({}): {}",
                status, body
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Index(format!("Failed to parse search response: {}", e)))?;

        Ok(body
            .result
            .into_iter()
            .filter_map(|p| {
                p.payload.map(|payload| SearchHit {
                    score: p.score,
                    payload,
                })
            })
            .collect())
    }

    async fn upsert(&self, points: &[IndexedPoint]) -> AppResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let url = format!("{}/points?wait=true", self.collection_url());

        let body: Vec<serde_json::Value> = points
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": p.payload,
                })
            })
            .collect();

        let response = self
            .client
            .put(&url)
            .json(&json!({ "points": body }))
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Qdrant upsert failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Index(format!(
                "Qdrant upsert failed ({}): {}",
                status, body
            )));
        }

        Ok(())
    }

    async fn delete_where(&self, city_id: &str, uri: &str) -> AppResult<()> {
        let url = format!("{}/points/delete?wait=true", self.collection_url());

        let response = self
            .client
            .post(&url)
            .json(&json!({ "filter": Self::city_filter(city_id, Some(uri)) }))
            .send()
            .await
            .map_err(|e| AppError::Index(format!("Qdrant delete failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Index(format!(
                "Qdrant delete failed ({}): {}",
                status, body
            )));
        }

        Ok(())
    }

    async fn health(&self) -> IndexHealth {
        let result = self.client.get(self.collection_url()).send().await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<CollectionInfoResponse>().await {
                    Ok(info) => IndexHealth {
                        status: "ready".to_string(),
                        points_count: info.result.points_count,
                        error: None,
                    },
                    Err(e) => IndexHealth {
                        status: "unavailable".to_string(),
                        points_count: None,
                        error: Some(e.to_string()),
                    },
                }
            }
            Ok(response) => IndexHealth {
                status: "unavailable".to_string(),
                points_count: None,
                error: Some(format!("status {}", response.status())),
            },
            Err(e) => IndexHealth {
                status: "unavailable".to_string(),
                points_count: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn index(server: &MockServer) -> QdrantIndex {
        QdrantIndex::new(&server.base_url(), "civica", 3).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_collection_noop_when_present() {
        let server = MockServer::start();
        let get = server.mock(|when, then| {
            when.method(GET).path("/collections/civica");
            then.status(200).json_body(serde_json::json!({ "result": {} }));
        });

        index(&server).ensure_collection().await.unwrap();
        get.assert();
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_when_missing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/collections/civica");
            then.status(404);
        });
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path("/collections/civica")
                .json_body_partial(r#"{ "vectors": { "size": 3, "distance": "Cosine" } }"#);
            then.status(200).json_body(serde_json::json!({ "result": true }));
        });

        index(&server).ensure_collection().await.unwrap();
        put.assert();
    }

    #[tokio::test]
    async fn test_search_parses_hits_and_filters_city() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(POST)
                .path("/collections/civica/points/search")
                .json_body_partial(
                    r#"{ "filter": { "must": [ { "key": "city_id", "match": { "value": "springfield" } } ] } }"#,
                );
            then.status(200).json_body(serde_json::json!({
                "result": [
                    {
                        "id": "p1",
                        "score": 0.82,
                        "payload": {
                            "city_id": "springfield",
                            "doc_id": "d1",
                            "chunk_id": "https://s.test/a#0",
                            "chunk_index": 0,
                            "uri": "https://s.test/a",
                            "title": "Hours",
                            "text": "Open 8am.",
                            "content_hash": "abc",
                            "updated_at": "2024-01-01T00:00:00Z"
                        }
                    }
                ]
            }));
        });

        let hits = index(&server)
            .search("springfield", &[1.0, 0.0, 0.0], 8)
            .await
            .unwrap();

        search.assert();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.82).abs() < 1e-6);
        assert_eq!(hits[0].payload.title, "Hours");
    }

    #[tokio::test]
    async fn test_upsert_skips_empty_batch() {
        let server = MockServer::start();
        let put = server.mock(|when, then| {
            when.method(PUT).path("/collections/civica/points");
            then.status(200);
        });

        index(&server).upsert(&[]).await.unwrap();
        assert_eq!(put.hits(), 0);
    }

    #[tokio::test]
    async fn test_delete_where_sends_city_and_uri_filter() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(POST)
                .path("/collections/civica/points/delete")
                .json_body_partial(
                    r#"{ "filter": { "must": [
                        { "key": "city_id", "match": { "value": "springfield" } },
                        { "key": "uri", "match": { "value": "https://s.test/a" } }
                    ] } }"#,
                );
            then.status(200).json_body(serde_json::json!({ "result": true }));
        });

        index(&server)
            .delete_where("springfield", "https://s.test/a")
            .await
            .unwrap();
        delete.assert();
    }

    #[tokio::test]
    async fn test_health_unreachable() {
        let health = QdrantIndex::new("http://127.0.0.1:1", "civica", 3)
            .unwrap()
            .health()
            .await;
        assert_eq!(health.status, "unavailable");
        assert!(health.error.is_some());
    }
}
