//! Analytics event sink.
//!
//! Query and feedback events are append-only JSON lines. Writes are
//! fire-and-forget from the pipeline's perspective: callers swallow errors,
//! surfacing at most a soft `analytics_logged: false` flag. Aggregation and
//! reporting live elsewhere.
//!
//! Raw query text is never stored; events carry a hash of the normalized
//! query instead.

use chrono::Utc;
use civica_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// Feedback comments longer than this are truncated.
const MAX_COMMENT_CHARS: usize = 1000;

/// A recorded query outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEvent {
    pub city_id: String,
    pub query_id: String,
    pub session_id: Option<String>,
    pub query_hash: String,
    pub latency_ms: u64,
    pub refused: bool,
    pub refusal_reason: Option<String>,
    pub retrieved_k: usize,
    pub citations_count: usize,
    pub model: Option<String>,
}

/// Structured reasons a user can give with negative feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackReason {
    MissingInfo,
    Incorrect,
    Unclear,
    Outdated,
    Other,
}

/// A recorded user-feedback submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub city_id: String,
    pub query_id: String,
    pub session_id: Option<String>,
    pub helpful: bool,
    pub reason: Option<FeedbackReason>,
    pub escalation_requested: bool,
    pub comment: Option<String>,
}

/// Hash of the normalized query text, for privacy-safe analytics.
pub fn hash_query(query: &str) -> String {
    format!("{:x}", Sha256::digest(query.trim().to_lowercase().as_bytes()))
}

/// Destination for analytics events.
pub trait AnalyticsSink: Send + Sync {
    /// Record a query event; returns the event id.
    fn record_query(&self, event: &QueryEvent) -> AppResult<String>;

    /// Record a feedback event; returns the event id.
    fn record_feedback(&self, event: &FeedbackEvent) -> AppResult<String>;
}

/// Appends events as JSON lines to a single file.
pub struct JsonlAnalytics {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAnalytics {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, event: serde_json::Value) -> AppResult<()> {
        let line = serde_json::to_string(&event)?;

        let _guard = self.lock.lock().expect("analytics lock poisoned");

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                AppError::Io(std::io::Error::other(format!(
                    "Failed to open {:?}: {}",
                    self.path, e
                )))
            })?;

        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl AnalyticsSink for JsonlAnalytics {
    fn record_query(&self, event: &QueryEvent) -> AppResult<String> {
        let event_id = Uuid::new_v4().simple().to_string();

        self.append(json!({
            "event_id": event_id,
            "event_type": "query",
            "timestamp": Utc::now().to_rfc3339(),
            "city_id": event.city_id,
            "query_id": event.query_id,
            "session_id": event.session_id,
            "query_hash": event.query_hash,
            "latency_ms": event.latency_ms,
            "refused": event.refused,
            "refusal_reason": event.refusal_reason,
            "retrieved_k": event.retrieved_k,
            "citations_count": event.citations_count,
            "model": event.model,
        }))?;

        Ok(event_id)
    }

    fn record_feedback(&self, event: &FeedbackEvent) -> AppResult<String> {
        let event_id = Uuid::new_v4().simple().to_string();

        let comment = event
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| c.chars().take(MAX_COMMENT_CHARS).collect::<String>());

        self.append(json!({
            "event_id": event_id,
            "event_type": "feedback",
            "timestamp": Utc::now().to_rfc3339(),
            "city_id": event.city_id,
            "query_id": event.query_id,
            "session_id": event.session_id,
            "helpful": event.helpful,
            "reason": event.reason,
            "escalation_requested": event.escalation_requested,
            "comment": comment,
        }))?;

        Ok(event_id)
    }
}

/// Sink that records nothing. Used in tests and when analytics is disabled.
#[derive(Debug, Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn record_query(&self, _event: &QueryEvent) -> AppResult<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }

    fn record_feedback(&self, _event: &FeedbackEvent) -> AppResult<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }
}
