//! Grounding prompt construction.

use crate::rag::types::{RetrievedChunk, REFUSAL_ANSWER};
use civica_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::json;

/// Leading instruction of the grounding prompt. Also used by the generator
/// to detect template echo in model output.
pub const SYSTEM_INSTRUCTION: &str = "You are a municipal information assistant.";

/// Handlebars template for the grounding prompt.
const PROMPT_TEMPLATE: &str = "\
{{system}} Use only the provided sources. \
If the answer is not supported by the sources, respond with: {{refusal}}

Question:
{{query}}

Sources:
{{#each sources}}[Source {{number}}] title={{title}} uri={{uri}}
{{text}}

{{/each}}\
Return a concise answer and cite source numbers in brackets, e.g. [1].";

/// Render the grounding prompt for a query over the retrieved chunks.
pub fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text prompt; no HTML escaping.
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("grounding", PROMPT_TEMPLATE)
        .map_err(|e| AppError::Llm(format!("Failed to register prompt template: {}", e)))?;

    let sources: Vec<serde_json::Value> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            json!({
                "number": i + 1,
                "title": c.title,
                "uri": c.uri,
                "text": c.text,
            })
        })
        .collect();

    handlebars
        .render(
            "grounding",
            &json!({
                "system": SYSTEM_INSTRUCTION,
                "refusal": REFUSAL_ANSWER,
                "query": query,
                "sources": sources,
            }),
        )
        .map_err(|e| AppError::Llm(format!("Failed to render prompt template: {}", e)))
}
