//! Retrieval-augmented answering.
//!
//! Retrieval, guardrails, grounded generation with extractive fallback, and
//! the streaming variant of the pipeline.

pub mod generate;
pub mod guardrails;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod stream;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use guardrails::GuardrailPolicy;
pub use pipeline::{RagOptions, RagPipeline};
pub use stream::{StreamEvent, StreamMeta};
pub use types::{
    Citation, GuardrailVerdict, QueryMeta, QueryResponse, RefusalReason, RetrievedChunk,
    REFUSAL_ANSWER,
};
