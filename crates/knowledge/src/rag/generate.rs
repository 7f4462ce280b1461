//! Answer generation with extractive fallback.
//!
//! Generation is best-effort: any backend failure, empty output, or output
//! that echoes the prompt template degrades to an extractive answer built
//! from the top retrieved chunk. Generation failures never propagate.

use crate::rag::prompt::{build_prompt, SYSTEM_INSTRUCTION};
use crate::rag::types::{RetrievedChunk, REFUSAL_ANSWER};
use civica_llm::{LlmClient, LlmRequest};

/// Maximum length of the extractive fallback, in characters.
const FALLBACK_MAX_CHARS: usize = 1200;

/// How many leading sentences the extractive fallback keeps.
const FALLBACK_SENTENCES: usize = 2;

/// Output containing any of these is treated as prompt leakage.
const LEAK_MARKERS: [&str; 3] = ["Sources:", "Question:", SYSTEM_INSTRUCTION];

/// Generation knobs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Attempt a grounded generation. Returns `None` when the backend fails,
/// returns nothing usable, or echoes the prompt template; the caller then
/// falls back to [`fallback_extractive`].
pub async fn try_generate(
    llm: &dyn LlmClient,
    options: &GenerationOptions,
    query: &str,
    chunks: &[RetrievedChunk],
) -> Option<String> {
    let prompt = match build_prompt(query, chunks) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!(error = %e, "Prompt construction failed");
            return None;
        }
    };

    let request = LlmRequest::new(prompt, options.model.clone())
        .with_temperature(options.temperature)
        .with_max_tokens(options.max_tokens)
        .with_stop(vec!["\nQuestion:".to_string(), "\nSources:".to_string()]);

    match llm.complete(&request).await {
        Ok(response) => {
            let text = response.content.trim().to_string();
            if text.is_empty() {
                tracing::debug!("Backend returned an empty answer");
                None
            } else if looks_like_leak(&text) {
                tracing::warn!("Backend output matched a prompt-leakage pattern");
                None
            } else {
                Some(text)
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Generation failed, using extractive fallback");
            None
        }
    }
}

/// Whether model output echoes the prompt template.
fn looks_like_leak(text: &str) -> bool {
    LEAK_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Build a non-generative answer from the top retrieved chunk: its first
/// sentences, length-capped. Returns the refusal sentence when there is no
/// usable text.
pub fn fallback_extractive(chunks: &[RetrievedChunk]) -> String {
    let Some(top) = chunks.first() else {
        return REFUSAL_ANSWER.to_string();
    };

    let text = top.text.trim();
    if text.is_empty() {
        return REFUSAL_ANSWER.to_string();
    }

    let joined = split_sentences(text)
        .into_iter()
        .take(FALLBACK_SENTENCES)
        .collect::<Vec<_>>()
        .join(" ");

    truncate_chars(&joined, FALLBACK_MAX_CHARS)
}

/// Split text into sentence fragments, keeping the terminator with each
/// fragment. Text without terminators is one fragment.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let fragment = current.trim();
            if !fragment.is_empty() {
                sentences.push(fragment.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    sentences
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
