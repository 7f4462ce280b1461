//! Query-time retrieval.

use crate::embeddings::EmbeddingProvider;
use crate::rag::types::RetrievedChunk;
use crate::vector::VectorIndex;
use civica_core::AppResult;

/// Embed the query and run a city-scoped similarity search.
///
/// Results arrive in descending score order and live only for this query.
pub async fn retrieve_chunks(
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    city_id: &str,
    query: &str,
    top_k: usize,
) -> AppResult<Vec<RetrievedChunk>> {
    let query_vector = embedder.embed(query).await?;
    let hits = index.search(city_id, &query_vector, top_k).await?;

    tracing::debug!(city = city_id, hits = hits.len(), "Retrieved chunks");

    Ok(hits
        .into_iter()
        .map(|hit| RetrievedChunk {
            score: hit.score,
            text: hit.payload.text,
            title: hit.payload.title,
            uri: hit.payload.uri,
            chunk_id: hit.payload.chunk_id,
            doc_id: hit.payload.doc_id,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::hash::HashEmbeddings;
    use crate::vector::{IndexedPoint, MemoryIndex, PointPayload};

    async fn seed(index: &MemoryIndex, embedder: &HashEmbeddings, city: &str, text: &str) {
        let vector = embedder.embed(text).await.unwrap();
        index
            .upsert(&[IndexedPoint {
                id: format!("{}:{}", city, text),
                vector,
                payload: PointPayload {
                    city_id: city.to_string(),
                    doc_id: "d".to_string(),
                    chunk_id: "c".to_string(),
                    chunk_index: 0,
                    uri: "https://s.test/doc".to_string(),
                    title: "Doc".to_string(),
                    text: text.to_string(),
                    content_hash: "h".to_string(),
                    updated_at: "2024-01-01T00:00:00Z".to_string(),
                },
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retrieval_is_city_scoped_and_ranked() {
        let embedder = HashEmbeddings::new(64);
        let index = MemoryIndex::new();

        seed(&index, &embedder, "springfield", "trash pickup schedule details").await;
        seed(&index, &embedder, "springfield", "municipal pool opening season").await;
        seed(&index, &embedder, "shelbyville", "trash pickup schedule details").await;

        let chunks = retrieve_chunks(
            &embedder,
            &index,
            "springfield",
            "trash pickup schedule details",
            8,
        )
        .await
        .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "trash pickup schedule details");
        assert!(chunks[0].score > chunks[1].score);
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let embedder = HashEmbeddings::new(64);
        let index = MemoryIndex::new();

        let chunks = retrieve_chunks(&embedder, &index, "springfield", "anything", 8)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }
}
