//! The non-streaming query pipeline.
//!
//! Retrieval → pre-generation guardrail → generation → post-generation
//! guardrail → citations. Generation failures degrade to the extractive
//! fallback; only malformed input surfaces as an error.

use crate::analytics::{hash_query, AnalyticsSink, QueryEvent};
use crate::embeddings::EmbeddingProvider;
use crate::rag::generate::{fallback_extractive, try_generate, GenerationOptions};
use crate::rag::guardrails::GuardrailPolicy;
use crate::rag::retrieve::retrieve_chunks;
use crate::rag::types::{
    build_citations, QueryMeta, QueryResponse, RetrievedChunk, REFUSAL_ANSWER,
};
use crate::vector::VectorIndex;
use civica_core::{AppError, AppResult};
use civica_llm::LlmClient;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Shortest accepted city id and query, in characters.
const MIN_FIELD_CHARS: usize = 2;

/// Pipeline tuning, resolved from configuration.
#[derive(Debug, Clone)]
pub struct RagOptions {
    /// Generation model identifier
    pub model: String,

    /// Number of chunks retrieved per query
    pub top_k: usize,

    /// Sampling temperature for generation
    pub temperature: f32,

    /// Output token budget for generation
    pub max_tokens: u32,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            model: "phi3:mini".to_string(),
            top_k: 8,
            temperature: 0.1,
            max_tokens: 120,
        }
    }
}

/// One city-scoped question-answering pipeline over injected backends.
///
/// Queries are stateless; any number may run concurrently against the same
/// pipeline instance.
#[derive(Clone)]
pub struct RagPipeline {
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) index: Arc<dyn VectorIndex>,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) analytics: Arc<dyn AnalyticsSink>,
    pub(crate) policy: GuardrailPolicy,
    pub(crate) options: RagOptions,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmClient>,
        analytics: Arc<dyn AnalyticsSink>,
        policy: GuardrailPolicy,
        options: RagOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            analytics,
            policy,
            options,
        }
    }

    /// Answer one question, or refuse with a machine-readable reason.
    pub async fn answer(
        &self,
        city_id: &str,
        query: &str,
        session_id: Option<&str>,
    ) -> AppResult<QueryResponse> {
        validate_request(city_id, query)?;

        let started = Instant::now();
        let query_id = Uuid::new_v4().simple().to_string();

        let chunks = retrieve_chunks(
            self.embedder.as_ref(),
            self.index.as_ref(),
            city_id,
            query,
            self.options.top_k,
        )
        .await?;

        let verdict = self.policy.should_refuse(query, &chunks);

        if verdict.refused {
            tracing::info!(
                city = city_id,
                reason = verdict.reason.map(|r| r.as_str()),
                "Refusing to answer"
            );

            let latency_ms = started.elapsed().as_millis() as u64;
            let logged = self.record_query(QueryEvent {
                city_id: city_id.to_string(),
                query_id: query_id.clone(),
                session_id: session_id.map(str::to_string),
                query_hash: hash_query(query),
                latency_ms,
                refused: true,
                refusal_reason: verdict.reason.map(|r| r.as_str().to_string()),
                retrieved_k: chunks.len(),
                citations_count: 0,
                model: None,
            });

            return Ok(QueryResponse {
                answer: REFUSAL_ANSWER.to_string(),
                citations: Vec::new(),
                meta: QueryMeta {
                    city_id: city_id.to_string(),
                    retrieved_k: chunks.len(),
                    refused: true,
                    reason: verdict.reason,
                    coverage: Some(verdict.coverage),
                    top_score: verdict.top_score,
                    model: None,
                    session_id: session_id.map(str::to_string),
                    query_id,
                    latency_ms,
                    analytics_logged: soft_flag(logged),
                },
            });
        }

        let answer = self.generate_or_fallback(query, &chunks).await;
        let citations = build_citations(&chunks);

        let latency_ms = started.elapsed().as_millis() as u64;
        let logged = self.record_query(QueryEvent {
            city_id: city_id.to_string(),
            query_id: query_id.clone(),
            session_id: session_id.map(str::to_string),
            query_hash: hash_query(query),
            latency_ms,
            refused: false,
            refusal_reason: None,
            retrieved_k: chunks.len(),
            citations_count: citations.len(),
            model: Some(self.options.model.clone()),
        });

        Ok(QueryResponse {
            answer,
            citations,
            meta: QueryMeta {
                city_id: city_id.to_string(),
                retrieved_k: chunks.len(),
                refused: false,
                reason: None,
                coverage: Some(verdict.coverage),
                top_score: verdict.top_score,
                model: Some(self.options.model.clone()),
                session_id: session_id.map(str::to_string),
                query_id,
                latency_ms,
                analytics_logged: soft_flag(logged),
            },
        })
    }

    /// Generate an answer and vet it with the post-generation gate; anything
    /// short of a grounded generation degrades to the extractive fallback.
    async fn generate_or_fallback(&self, query: &str, chunks: &[RetrievedChunk]) -> String {
        let generation = GenerationOptions {
            model: self.options.model.clone(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        match try_generate(self.llm.as_ref(), &generation, query, chunks).await {
            Some(text) => {
                if self.policy.should_discard_answer(query, &text, chunks) {
                    tracing::warn!("Answer failed the post-generation gate, using extractive fallback");
                    fallback_extractive(chunks)
                } else {
                    text
                }
            }
            None => fallback_extractive(chunks),
        }
    }

    /// Record a query event; analytics failures are swallowed and reported
    /// only through the returned flag.
    pub(crate) fn record_query(&self, event: QueryEvent) -> bool {
        match self.analytics.record_query(&event) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Analytics write failed");
                false
            }
        }
    }
}

/// Reject queries the pipeline cannot meaningfully serve.
pub(crate) fn validate_request(city_id: &str, query: &str) -> AppResult<()> {
    if city_id.trim().chars().count() < MIN_FIELD_CHARS {
        return Err(AppError::InvalidRequest(
            "city_id must be at least 2 characters".to_string(),
        ));
    }
    if query.trim().chars().count() < MIN_FIELD_CHARS {
        return Err(AppError::InvalidRequest(
            "query must be at least 2 characters".to_string(),
        ));
    }
    Ok(())
}

/// The soft-failure flag is only present when something went wrong.
fn soft_flag(logged: bool) -> Option<bool> {
    if logged {
        None
    } else {
        Some(false)
    }
}
