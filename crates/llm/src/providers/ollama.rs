//! Ollama LLM backend implementation.
//!
//! Talks to a local Ollama runtime over HTTP. The non-streaming path returns
//! a single JSON object; the streaming path yields newline-delimited JSON
//! token deltas terminated by a `done: true` record.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk};
use civica_core::{AppError, AppResult};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

/// Sampling options forwarded to the runtime.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

/// Ollama API response format (whole response or one stream delta).
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for the Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client against the default local endpoint.
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434", None)
    }

    /// Create a new Ollama client with a custom base URL and request timeout.
    pub fn with_base_url(base_url: impl Into<String>, timeout_secs: Option<u64>) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Self {
            base_url: base_url.into(),
            client: builder.build().unwrap_or_default(),
        }
    }

    /// Convert an [`LlmRequest`] to the Ollama wire format.
    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            stream: request.stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                stop: request.stop.clone(),
            },
        }
    }

    async fn post_generate(&self, request: &OllamaRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Ollama");

        let mut ollama_request = self.to_ollama_request(request);
        ollama_request.stream = false;

        let response = self.post_generate(&ollama_request).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(model = %ollama_response.model, "Received completion from Ollama");

        Ok(LlmResponse {
            content: ollama_response.response,
            model: ollama_response.model,
            done: ollama_response.done,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Ollama");

        let mut ollama_request = self.to_ollama_request(request);
        ollama_request.stream = true;

        let response = self.post_generate(&ollama_request).await?;

        // Ollama sends newline-delimited JSON. Malformed lines are skipped
        // rather than surfaced, matching a lenient line reader; transport
        // errors terminate the stream with an error item.
        let stream = response.bytes_stream().map(|result| {
            let bytes =
                result.map_err(|e| AppError::Llm(format!("Stream error: {}", e)))?;

            let text = String::from_utf8_lossy(&bytes);
            let chunks: Vec<AppResult<LlmStreamChunk>> = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| match serde_json::from_str::<OllamaResponse>(line) {
                    Ok(delta) => Some(Ok(LlmStreamChunk {
                        content: delta.response,
                        done: delta.done,
                    })),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping malformed stream line");
                        None
                    }
                })
                .collect();

            Ok(futures::stream::iter(chunks))
        });

        Ok(Box::pin(stream.flat_map(|result| match result {
            Ok(chunks) => chunks.boxed(),
            Err(e) => futures::stream::iter(vec![Err(e)]).boxed(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("Hello", "phi3:mini")
            .with_temperature(0.1)
            .with_max_tokens(120)
            .with_stop(vec!["\nSources:".to_string()]);

        let ollama_req = client.to_ollama_request(&request);
        assert_eq!(ollama_req.model, "phi3:mini");
        assert_eq!(ollama_req.prompt, "Hello");
        assert_eq!(ollama_req.options.temperature, Some(0.1));
        assert_eq!(ollama_req.options.num_predict, Some(120));
        assert_eq!(ollama_req.options.stop, vec!["\nSources:".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_parses_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200).json_body(serde_json::json!({
                "model": "phi3:mini",
                "response": "City Hall opens at 8am. [1]",
                "done": true
            }));
        });

        let client = OllamaClient::with_base_url(server.base_url(), Some(5));
        let response = client
            .complete(&LlmRequest::new("hours?", "phi3:mini"))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.content, "City Hall opens at 8am. [1]");
        assert!(response.done);
    }

    #[tokio::test]
    async fn test_complete_non_2xx_is_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(500).body("model not loaded");
        });

        let client = OllamaClient::with_base_url(server.base_url(), Some(5));
        let result = client.complete(&LlmRequest::new("hours?", "phi3:mini")).await;

        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas_until_done() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200).body(concat!(
                "{\"model\":\"phi3:mini\",\"response\":\"City \",\"done\":false}\n",
                "{\"model\":\"phi3:mini\",\"response\":\"Hall\",\"done\":false}\n",
                "{\"model\":\"phi3:mini\",\"response\":\"\",\"done\":true}\n",
            ));
        });

        let client = OllamaClient::with_base_url(server.base_url(), Some(5));
        let mut stream = client
            .stream(&LlmRequest::new("hours?", "phi3:mini").with_streaming())
            .await
            .unwrap();

        let mut tokens = Vec::new();
        let mut saw_done = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            if chunk.done {
                saw_done = true;
                break;
            }
            tokens.push(chunk.content);
        }

        assert_eq!(tokens, vec!["City ".to_string(), "Hall".to_string()]);
        assert!(saw_done);
    }
}
