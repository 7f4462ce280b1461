//! Source document fetching.

use civica_core::{AppError, AppResult};
use std::time::Duration;

/// Default content type assumed when the server sends none.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Trait for fetching raw source documents.
///
/// The sync engine depends on this seam; tests substitute a canned fetcher.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch a source, returning its raw bytes and declared content type.
    ///
    /// Non-2xx responses are failures.
    async fn fetch(&self, uri: &str) -> AppResult<(Vec<u8>, String)>;
}

/// HTTP fetcher over reqwest with a configured timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> AppResult<(Vec<u8>, String)> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("{}: {}", uri, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "{}: status {}",
                uri,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Fetch(format!("{}: {}", uri, e)))?;

        Ok((bytes.to_vec(), content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_fetch_returns_bytes_and_content_type() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/hours");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<html><body>hi</body></html>");
        });

        let fetcher = HttpFetcher::new(5).unwrap();
        let (bytes, content_type) = fetcher.fetch(&server.url("/hours")).await.unwrap();

        assert_eq!(bytes, b"<html><body>hi</body></html>");
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_fetch_defaults_content_type() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/raw");
            then.status(200).body("plain bytes");
        });

        let fetcher = HttpFetcher::new(5).unwrap();
        let (_, content_type) = fetcher.fetch(&server.url("/raw")).await.unwrap();

        assert_eq!(content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404).body("not found");
        });

        let fetcher = HttpFetcher::new(5).unwrap();
        let result = fetcher.fetch(&server.url("/gone")).await;

        match result {
            Err(AppError::Fetch(message)) => assert!(message.contains("404")),
            other => panic!("expected fetch error, got {:?}", other.map(|_| ())),
        }
    }
}
