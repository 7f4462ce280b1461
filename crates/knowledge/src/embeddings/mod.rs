//! Embedding generation.
//!
//! Maps text to fixed-size vectors through a provider abstraction. The
//! Ollama provider is the production path; the hash provider is a
//! deterministic offline stand-in with the same contract.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
