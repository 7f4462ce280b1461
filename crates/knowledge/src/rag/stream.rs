//! Streaming query orchestration.
//!
//! Runs the same retrieval and confidence gates as the non-streaming
//! pipeline but emits incremental events instead of one response: a `meta`
//! event with citations, `token` events as the backend produces them, and a
//! terminal `done` event. A producer task feeds a bounded channel; the
//! caller drains it into whatever transport it serves.
//!
//! Deliberate asymmetry with the non-streaming path: the lexical coverage
//! check does not run here, only the no-hits and low-confidence gates.

use crate::analytics::{hash_query, QueryEvent};
use crate::rag::generate::fallback_extractive;
use crate::rag::pipeline::{validate_request, RagPipeline};
use crate::rag::prompt::build_prompt;
use crate::rag::retrieve::retrieve_chunks;
use crate::rag::types::{build_citations, Citation, RefusalReason, REFUSAL_ANSWER};
use civica_llm::LlmRequest;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Buffered events between the producer task and the consumer.
const CHANNEL_CAPACITY: usize = 32;

/// Metadata emitted once per stream, before any token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMeta {
    /// City the query was scoped to
    pub city_id: String,

    /// Number of chunks retrieval returned
    pub retrieved_k: usize,

    /// Whether the system declined to answer
    pub refused: bool,

    /// Refusal reason, present when refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RefusalReason>,

    /// Best retrieval score, when something was retrieved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_score: Option<f32>,

    /// Generation model identifier
    pub model: String,

    /// Caller-provided session identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Server-assigned query identifier
    pub query_id: String,

    /// Source references, independent of the refusal decision
    pub citations: Vec<Citation>,
}

/// One event in a streaming answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Retrieval outcome and citations; always first
    Meta(StreamMeta),

    /// One incremental piece of answer text
    Token { token: String },

    /// Terminal event carrying total latency and the refusal flag
    Done { latency_ms: u64, refused: bool },

    /// Malformed request or failed retrieval; terminal, no `done` follows
    Error { error: String },
}

impl RagPipeline {
    /// Answer one question as an event stream.
    ///
    /// The producer runs in its own task; dropping the receiver abandons it
    /// without touching shared state.
    pub fn stream(
        &self,
        city_id: &str,
        query: &str,
        session_id: Option<&str>,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let pipeline = self.clone();
        let city_id = city_id.to_string();
        let query = query.to_string();
        let session_id = session_id.map(str::to_string);

        tokio::spawn(async move {
            pipeline.run_stream(city_id, query, session_id, tx).await;
        });

        rx
    }

    async fn run_stream(
        &self,
        city_id: String,
        query: String,
        session_id: Option<String>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        if let Err(e) = validate_request(&city_id, &query) {
            let _ = tx
                .send(StreamEvent::Error {
                    error: e.to_string(),
                })
                .await;
            return;
        }

        let started = Instant::now();
        let query_id = Uuid::new_v4().simple().to_string();

        let chunks = match retrieve_chunks(
            self.embedder.as_ref(),
            self.index.as_ref(),
            &city_id,
            &query,
            self.options.top_k,
        )
        .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(city = %city_id, error = %e, "Retrieval failed mid-stream");
                let _ = tx
                    .send(StreamEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let citations = build_citations(&chunks);
        let top_score = chunks.first().map(|c| c.score);

        // Confidence gates only; the coverage check is not applied here.
        let refusal_reason = if chunks.is_empty() {
            Some(RefusalReason::NoRetrievalHits)
        } else if top_score.unwrap_or(0.0) < self.policy.similarity_threshold {
            Some(RefusalReason::LowConfidence)
        } else {
            None
        };

        let meta = StreamMeta {
            city_id: city_id.clone(),
            retrieved_k: chunks.len(),
            refused: refusal_reason.is_some(),
            reason: refusal_reason,
            top_score,
            model: self.options.model.clone(),
            session_id: session_id.clone(),
            query_id: query_id.clone(),
            citations: citations.clone(),
        };

        if tx.send(StreamEvent::Meta(meta)).await.is_err() {
            return;
        }

        if let Some(reason) = refusal_reason {
            if tx
                .send(StreamEvent::Token {
                    token: REFUSAL_ANSWER.to_string(),
                })
                .await
                .is_err()
            {
                return;
            }

            let latency_ms = started.elapsed().as_millis() as u64;
            self.record_query(QueryEvent {
                city_id,
                query_id,
                session_id,
                query_hash: hash_query(&query),
                latency_ms,
                refused: true,
                refusal_reason: Some(reason.as_str().to_string()),
                retrieved_k: chunks.len(),
                citations_count: citations.len(),
                model: Some(self.options.model.clone()),
            });

            let _ = tx
                .send(StreamEvent::Done {
                    latency_ms,
                    refused: true,
                })
                .await;
            return;
        }

        let mut token_count = 0usize;
        let mut stream_failed = false;

        match build_prompt(&query, &chunks) {
            Ok(prompt) => {
                let request = LlmRequest::new(prompt, self.options.model.clone())
                    .with_temperature(self.options.temperature)
                    .with_max_tokens(self.options.max_tokens)
                    .with_stop(vec!["\nQuestion:".to_string(), "\nSources:".to_string()])
                    .with_streaming();

                match self.llm.stream(&request).await {
                    Ok(mut backend) => {
                        while let Some(item) = backend.next().await {
                            match item {
                                Ok(chunk) => {
                                    if !chunk.content.is_empty() {
                                        token_count += 1;
                                        if tx
                                            .send(StreamEvent::Token {
                                                token: chunk.content,
                                            })
                                            .await
                                            .is_err()
                                        {
                                            // Client gone; abandon quietly.
                                            return;
                                        }
                                    }
                                    if chunk.done {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Token stream failed");
                                    stream_failed = true;
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Backend refused the stream");
                        stream_failed = true;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Prompt construction failed");
                stream_failed = true;
            }
        }

        if stream_failed || token_count == 0 {
            let fallback = fallback_extractive(&chunks);
            if tx.send(StreamEvent::Token { token: fallback }).await.is_err() {
                return;
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;

        // Recorded just before done; a failed write must not break the stream.
        self.record_query(QueryEvent {
            city_id,
            query_id,
            session_id,
            query_hash: hash_query(&query),
            latency_ms,
            refused: false,
            refusal_reason: None,
            retrieved_k: chunks.len(),
            citations_count: citations.len(),
            model: Some(self.options.model.clone()),
        });

        let _ = tx
            .send(StreamEvent::Done {
                latency_ms,
                refused: false,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::NoopAnalytics;
    use crate::embeddings::providers::hash::HashEmbeddings;
    use crate::rag::guardrails::GuardrailPolicy;
    use crate::rag::pipeline::RagOptions;
    use crate::rag::testing::{MockLlm, MockStream, StubIndex};
    use std::sync::Arc;

    const QUERY: &str = "library parking garage hours";
    const CHUNK_TEXT: &str =
        "The library parking garage hours are 8am to 10pm. Enter from Main Street.";

    fn pipeline(index: StubIndex, llm: MockLlm) -> RagPipeline {
        RagPipeline::new(
            Arc::new(HashEmbeddings::new(16)),
            Arc::new(index),
            Arc::new(llm),
            Arc::new(NoopAnalytics),
            GuardrailPolicy::default(),
            RagOptions::default(),
        )
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_no_hits_refusal_sequence() {
        let pipeline = pipeline(StubIndex::empty(), MockLlm::default());
        let events = collect(pipeline.stream("springfield", QUERY, None)).await;

        assert_eq!(events.len(), 3);
        match &events[0] {
            StreamEvent::Meta(meta) => {
                assert!(meta.refused);
                assert_eq!(meta.reason, Some(RefusalReason::NoRetrievalHits));
                assert!(meta.citations.is_empty());
                assert_eq!(meta.retrieved_k, 0);
            }
            other => panic!("expected meta first, got {:?}", other),
        }
        match &events[1] {
            StreamEvent::Token { token } => assert_eq!(token, REFUSAL_ANSWER),
            other => panic!("expected token, got {:?}", other),
        }
        match &events[2] {
            StreamEvent::Done { refused, .. } => assert!(refused),
            other => panic!("expected done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_low_confidence_refusal_keeps_citations() {
        let index = StubIndex::with_hits(&[(CHUNK_TEXT, 0.05)]);
        let pipeline = pipeline(index, MockLlm::default());
        let events = collect(pipeline.stream("springfield", QUERY, None)).await;

        match &events[0] {
            StreamEvent::Meta(meta) => {
                assert!(meta.refused);
                assert_eq!(meta.reason, Some(RefusalReason::LowConfidence));
                // Citations are computed regardless of the refusal.
                assert_eq!(meta.citations.len(), 1);
            }
            other => panic!("expected meta first, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tokens_forwarded_until_done() {
        let index = StubIndex::with_hits(&[(CHUNK_TEXT, 0.90)]);
        let pipeline = pipeline(index, MockLlm::streaming(&["The ", "garage ", "is open."]));
        let events = collect(pipeline.stream("springfield", QUERY, Some("s1"))).await;

        assert_eq!(events.len(), 5);
        match &events[0] {
            StreamEvent::Meta(meta) => {
                assert!(!meta.refused);
                assert_eq!(meta.session_id, Some("s1".to_string()));
            }
            other => panic!("expected meta first, got {:?}", other),
        }

        let tokens: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token { token } => Some(token.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens.join(""), "The garage is open.");

        match events.last().unwrap() {
            StreamEvent::Done { refused, .. } => assert!(!refused),
            other => panic!("expected done last, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_failure_emits_single_fallback_token() {
        let index = StubIndex::with_hits(&[(CHUNK_TEXT, 0.90)]);
        let pipeline = pipeline(index, MockLlm::stream_failing());
        let events = collect(pipeline.stream("springfield", QUERY, None)).await;

        // Exactly meta, one fallback token, done.
        assert_eq!(events.len(), 3);
        match &events[0] {
            StreamEvent::Meta(meta) => assert!(!meta.refused),
            other => panic!("expected meta first, got {:?}", other),
        }
        match &events[1] {
            StreamEvent::Token { token } => assert_eq!(
                token,
                "The library parking garage hours are 8am to 10pm. Enter from Main Street."
            ),
            other => panic!("expected fallback token, got {:?}", other),
        }
        match &events[2] {
            StreamEvent::Done { refused, .. } => assert!(!refused),
            other => panic!("expected done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_falls_back() {
        let index = StubIndex::with_hits(&[(CHUNK_TEXT, 0.90)]);
        let pipeline = pipeline(
            index,
            MockLlm {
                stream: MockStream::Empty,
                ..Default::default()
            },
        );
        let events = collect(pipeline.stream("springfield", QUERY, None)).await;

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], StreamEvent::Token { .. }));
    }

    #[tokio::test]
    async fn test_mid_stream_error_appends_fallback() {
        let index = StubIndex::with_hits(&[(CHUNK_TEXT, 0.90)]);
        let pipeline = pipeline(
            index,
            MockLlm {
                stream: MockStream::TokensThenError(vec!["Partial ".to_string()]),
                ..Default::default()
            },
        );
        let events = collect(pipeline.stream("springfield", QUERY, None)).await;

        // meta, the partial token, the fallback token, done.
        assert_eq!(events.len(), 4);
        match &events[2] {
            StreamEvent::Token { token } => assert!(token.starts_with("The library")),
            other => panic!("expected fallback token, got {:?}", other),
        }
        assert!(matches!(events.last().unwrap(), StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn test_coverage_gate_not_applied_in_streaming() {
        // Disjoint vocabulary would refuse with low_coverage in the
        // non-streaming path; the streaming path proceeds to generation.
        let index = StubIndex::with_hits(&[("zoning variance appeals procedure", 0.90)]);
        let pipeline = pipeline(index, MockLlm::streaming(&["answer"]));
        let events = collect(pipeline.stream("springfield", QUERY, None)).await;

        match &events[0] {
            StreamEvent::Meta(meta) => assert!(!meta.refused),
            other => panic!("expected meta first, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_request_is_a_typed_error() {
        let pipeline = pipeline(StubIndex::empty(), MockLlm::default());
        let events = collect(pipeline.stream("", QUERY, None)).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error { error } => assert!(error.contains("city_id")),
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = StreamEvent::Token {
            token: "hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "token");
        assert_eq!(json["data"]["token"], "hello");

        let done = StreamEvent::Done {
            latency_ms: 12,
            refused: false,
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["event"], "done");
        assert_eq!(json["data"]["latency_ms"], 12);
    }
}
