//! Command handlers for the Civica CLI.

pub mod ask;
pub mod feedback;
pub mod status;
pub mod sync;

pub use ask::AskCommand;
pub use feedback::FeedbackCommand;
pub use status::StatusCommand;
pub use sync::SyncCommand;

use civica_core::{AppConfig, AppResult};
use civica_knowledge::embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
use civica_knowledge::vector::{create_index, IndexConfig, VectorIndex};
use civica_knowledge::{
    GuardrailPolicy, HttpFetcher, JsonlAnalytics, RagOptions, RagPipeline, SyncEngine,
    SyncStateStore,
};
use std::sync::Arc;

/// Build the vector index backend from configuration.
pub(crate) fn build_index(config: &AppConfig) -> AppResult<Arc<dyn VectorIndex>> {
    create_index(&IndexConfig {
        backend: config.vector_backend.clone(),
        url: config.qdrant_url.clone(),
        collection: config.qdrant_collection.clone(),
        vector_size: config.vector_size,
    })
}

/// Build the embedding provider from configuration.
pub(crate) fn build_embedder(config: &AppConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    create_provider(&EmbeddingConfig {
        provider: config.embedding_provider.clone(),
        model: config.embedding_model.clone(),
        dimensions: config.vector_size,
        base_url: Some(config.ollama_url.clone()),
    })
}

/// Build the sync engine over the configured backends.
pub(crate) fn build_sync_engine(config: &AppConfig) -> AppResult<SyncEngine> {
    Ok(SyncEngine::new(
        Arc::new(HttpFetcher::new(config.fetch_timeout_secs)?),
        build_embedder(config)?,
        build_index(config)?,
        SyncStateStore::new(config.state_dir.clone()),
        config.city_dir.clone(),
    ))
}

/// Build the query pipeline over the configured backends.
pub(crate) fn build_pipeline(config: &AppConfig) -> AppResult<RagPipeline> {
    let llm = civica_llm::create_client(
        "ollama",
        Some(&config.ollama_url),
        Some(config.ollama_timeout_secs),
    )?;

    Ok(RagPipeline::new(
        build_embedder(config)?,
        build_index(config)?,
        llm,
        Arc::new(JsonlAnalytics::new(config.analytics_path())),
        GuardrailPolicy {
            similarity_threshold: config.similarity_threshold,
            coverage_threshold: config.coverage_threshold,
            min_keyword_count: config.min_keyword_count,
        },
        RagOptions {
            model: config.ollama_model.clone(),
            top_k: config.retrieval_top_k,
            temperature: config.generation_temperature,
            max_tokens: config.generation_max_tokens,
        },
    ))
}
