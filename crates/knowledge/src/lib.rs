//! Civica knowledge engine.
//!
//! The two halves of the system live here: the ingestion/sync engine that
//! turns crawled city documents into deduplicated, embedded, searchable
//! chunks, and the guardrailed RAG pipeline (plus its streaming variant)
//! that answers questions over them.

pub mod analytics;
pub mod chunker;
pub mod embeddings;
pub mod extract;
pub mod fetch;
pub mod rag;
pub mod sources;
pub mod state;
pub mod sync;
pub mod vector;

// Re-export commonly used types
pub use analytics::{AnalyticsSink, FeedbackEvent, FeedbackReason, JsonlAnalytics, QueryEvent};
pub use fetch::{HttpFetcher, SourceFetcher};
pub use rag::{
    Citation, GuardrailPolicy, QueryResponse, RagOptions, RagPipeline, RefusalReason, StreamEvent,
};
pub use state::SyncStateStore;
pub use sync::{SyncEngine, SyncReport};
pub use vector::{IndexConfig, VectorIndex};
