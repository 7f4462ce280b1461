//! Query pipeline types.

use serde::{Deserialize, Serialize};

/// The fixed sentence returned whenever the system declines to answer.
pub const REFUSAL_ANSWER: &str = "I don't know based on current city documents.";

/// Citations are drawn from at most this many top-ranked chunks.
pub const MAX_CITATIONS: usize = 3;

/// Maximum snippet length in a citation, in characters.
const SNIPPET_CHARS: usize = 220;

/// Machine-readable reason for declining to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    /// Retrieval returned no chunks for this city
    NoRetrievalHits,
    /// The best retrieval score fell below the similarity threshold
    LowConfidence,
    /// The retrieved text shares too little vocabulary with the query
    LowCoverage,
}

impl RefusalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefusalReason::NoRetrievalHits => "no_retrieval_hits",
            RefusalReason::LowConfidence => "low_confidence",
            RefusalReason::LowCoverage => "low_coverage",
        }
    }
}

/// A chunk returned by retrieval, alive for one query only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Similarity score from the vector search
    pub score: f32,

    /// Chunk text
    pub text: String,

    /// Title of the source document
    pub title: String,

    /// Source URI
    pub uri: String,

    /// Document-scoped chunk identifier (`<uri>#<index>`)
    pub chunk_id: String,

    /// Deterministic document identifier
    pub doc_id: String,
}

/// The outcome of the pre-generation guardrail checks.
#[derive(Debug, Clone)]
pub struct GuardrailVerdict {
    /// Whether the query is refused
    pub refused: bool,

    /// Refusal reason, present when refused
    pub reason: Option<RefusalReason>,

    /// Query-keyword coverage of the top chunks
    pub coverage: f32,

    /// Best retrieval score, absent when nothing was retrieved
    pub top_score: Option<f32>,
}

/// A user-facing source reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Title of the source document
    pub title: String,

    /// Source URI
    pub uri: String,

    /// Leading snippet of the cited chunk
    pub snippet: String,

    /// Similarity score of the cited chunk
    pub score: f32,
}

/// Build citations from the top retrieved chunks, preserving rank order.
pub fn build_citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    chunks
        .iter()
        .take(MAX_CITATIONS)
        .map(|c| Citation {
            title: c.title.clone(),
            uri: c.uri.clone(),
            snippet: c.text.chars().take(SNIPPET_CHARS).collect(),
            score: c.score,
        })
        .collect()
}

/// Metadata attached to every query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMeta {
    /// City the query was scoped to
    pub city_id: String,

    /// Number of chunks retrieval returned
    pub retrieved_k: usize,

    /// Whether the system declined to answer
    pub refused: bool,

    /// Refusal reason, present when refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RefusalReason>,

    /// Query-keyword coverage of the retrieved chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f32>,

    /// Best retrieval score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_score: Option<f32>,

    /// Generation model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Caller-provided session identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Server-assigned query identifier
    pub query_id: String,

    /// End-to-end latency in milliseconds
    pub latency_ms: u64,

    /// Set to `false` when the analytics write failed (soft signal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics_logged: Option<bool>,
}

/// A complete answer to one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Answer text (generated, extractive, or the refusal sentence)
    pub answer: String,

    /// Source references, at most [`MAX_CITATIONS`], in retrieval rank order
    pub citations: Vec<Citation>,

    /// Response metadata
    pub meta: QueryMeta,
}
