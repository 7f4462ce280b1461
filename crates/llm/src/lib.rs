//! LLM integration crate for Civica.
//!
//! Provides a backend-agnostic abstraction over language-model runtimes with
//! both one-shot completion and incremental token streaming. Ollama is the
//! only backend today; the trait keeps the pipeline decoupled from it.
//!
//! # Example
//! ```no_run
//! use civica_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Where is City Hall?", "phi3:mini");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk};
pub use factory::create_client;
pub use providers::OllamaClient;
