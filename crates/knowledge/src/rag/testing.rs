//! Shared test doubles for the query pipeline.

use crate::vector::{IndexHealth, IndexedPoint, PointPayload, SearchHit, VectorIndex};
use civica_core::{AppError, AppResult};
use civica_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk};

/// Canned behavior for the non-streaming completion call.
pub(crate) enum MockCompletion {
    Text(String),
    Fail,
}

/// Canned behavior for the streaming call.
pub(crate) enum MockStream {
    /// Yield these deltas, then a done marker.
    Tokens(Vec<String>),
    /// Yield only the done marker (a stream that produced nothing).
    Empty,
    /// Fail before the first delta.
    Fail,
    /// Yield these deltas, then a transport error.
    TokensThenError(Vec<String>),
}

pub(crate) struct MockLlm {
    pub completion: MockCompletion,
    pub stream: MockStream,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self {
            completion: MockCompletion::Text("mock answer".to_string()),
            stream: MockStream::Tokens(vec!["mock ".to_string(), "answer".to_string()]),
        }
    }
}

impl MockLlm {
    pub fn completing(text: &str) -> Self {
        Self {
            completion: MockCompletion::Text(text.to_string()),
            ..Default::default()
        }
    }

    pub fn streaming(tokens: &[&str]) -> Self {
        Self {
            stream: MockStream::Tokens(tokens.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn stream_failing() -> Self {
        Self {
            stream: MockStream::Fail,
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        match &self.completion {
            MockCompletion::Text(text) => Ok(LlmResponse {
                content: text.clone(),
                model: "mock".to_string(),
                done: true,
            }),
            MockCompletion::Fail => Err(AppError::Llm("backend unavailable".to_string())),
        }
    }

    async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
        let done = || -> AppResult<LlmStreamChunk> {
            Ok(LlmStreamChunk {
                content: String::new(),
                done: true,
            })
        };

        match &self.stream {
            MockStream::Fail => Err(AppError::Llm("backend unavailable".to_string())),
            MockStream::Empty => Ok(Box::pin(futures::stream::iter(vec![done()]))),
            MockStream::Tokens(tokens) => {
                let mut items: Vec<AppResult<LlmStreamChunk>> = tokens
                    .iter()
                    .map(|t| {
                        Ok(LlmStreamChunk {
                            content: t.clone(),
                            done: false,
                        })
                    })
                    .collect();
                items.push(done());
                Ok(Box::pin(futures::stream::iter(items)))
            }
            MockStream::TokensThenError(tokens) => {
                let mut items: Vec<AppResult<LlmStreamChunk>> = tokens
                    .iter()
                    .map(|t| {
                        Ok(LlmStreamChunk {
                            content: t.clone(),
                            done: false,
                        })
                    })
                    .collect();
                items.push(Err(AppError::Llm("connection reset".to_string())));
                Ok(Box::pin(futures::stream::iter(items)))
            }
        }
    }
}

/// Index double returning canned hits, for exact control over scores.
pub(crate) struct StubIndex {
    hits: Vec<SearchHit>,
}

impl StubIndex {
    pub fn empty() -> Self {
        Self { hits: Vec::new() }
    }

    /// Build hits from `(text, score)` pairs, ranked as given.
    pub fn with_hits(hits: &[(&str, f32)]) -> Self {
        Self {
            hits: hits
                .iter()
                .enumerate()
                .map(|(i, (text, score))| SearchHit {
                    score: *score,
                    payload: PointPayload {
                        city_id: "springfield".to_string(),
                        doc_id: format!("doc{}", i),
                        chunk_id: format!("https://s.test/doc{}#0", i),
                        chunk_index: 0,
                        uri: format!("https://s.test/doc{}", i),
                        title: format!("Doc {}", i),
                        text: text.to_string(),
                        content_hash: "hash".to_string(),
                        updated_at: "2024-01-01T00:00:00Z".to_string(),
                    },
                })
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl VectorIndex for StubIndex {
    async fn ensure_collection(&self) -> AppResult<()> {
        Ok(())
    }

    async fn search(
        &self,
        _city_id: &str,
        _query_vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }

    async fn upsert(&self, _points: &[IndexedPoint]) -> AppResult<()> {
        Ok(())
    }

    async fn delete_where(&self, _city_id: &str, _uri: &str) -> AppResult<()> {
        Ok(())
    }

    async fn health(&self) -> IndexHealth {
        IndexHealth {
            status: "ready".to_string(),
            points_count: Some(self.hits.len() as u64),
            error: None,
        }
    }
}
