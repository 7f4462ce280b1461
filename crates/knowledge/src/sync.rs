//! Per-city ingestion and synchronization.
//!
//! For each configured source: fetch, hash, compare against the last-known
//! content hash, extract, chunk, embed, and replace the source's points in
//! the vector index. One source failing never aborts the rest of the run;
//! the updated state is persisted once, after every source was attempted, so
//! failed sources keep their prior hash and are retried next run.

use crate::chunker::{chunk_text, DEFAULT_MAX_WORDS, DEFAULT_OVERLAP};
use crate::embeddings::EmbeddingProvider;
use crate::extract::extract_text;
use crate::fetch::SourceFetcher;
use crate::sources::load_city_sources;
use crate::state::SyncStateStore;
use crate::vector::{IndexedPoint, PointPayload, VectorIndex};
use chrono::Utc;
use civica_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Per-source error messages are truncated to this many characters.
const MAX_ERROR_CHARS: usize = 500;

/// Report of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// City that was synced
    pub city_id: String,

    /// Number of configured sources
    pub sources_total: usize,

    /// Sources whose content changed and was re-ingested
    pub sources_updated: usize,

    /// Sources left alone (unchanged hash or empty extraction)
    pub sources_skipped: usize,

    /// Total points written across all updated sources
    pub chunks_upserted: usize,

    /// Per-source failures; the run continues past each one
    pub errors: Vec<SyncError>,
}

/// A single source's failure inside a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub uri: String,
    pub error: String,
}

enum SourceOutcome {
    Skipped,
    Updated { chunks: usize },
}

/// Per-city mutual exclusion for sync runs.
///
/// The registry hands out one async mutex per city; `try_acquire` fails fast
/// instead of queueing so overlapping crawls surface as errors.
#[derive(Debug, Default, Clone)]
pub struct SyncLocks {
    inner: Arc<std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SyncLocks {
    fn try_acquire(&self, city_id: &str) -> Option<tokio::sync::OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self.inner.lock().expect("lock registry poisoned");
            map.entry(city_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.try_lock_owned().ok()
    }
}

/// Orchestrates ingestion for one city at a time.
pub struct SyncEngine {
    fetcher: Arc<dyn SourceFetcher>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    state: SyncStateStore,
    city_dir: PathBuf,
    locks: SyncLocks,
}

impl SyncEngine {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        state: SyncStateStore,
        city_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            embedder,
            index,
            state,
            city_dir: city_dir.into(),
            locks: SyncLocks::default(),
        }
    }

    /// Sync every configured source of one city.
    ///
    /// Rejects with [`AppError::SyncInProgress`] when another run for the
    /// same city holds the lock.
    pub async fn sync_city(&self, city_id: &str) -> AppResult<SyncReport> {
        let _guard = self
            .locks
            .try_acquire(city_id)
            .ok_or_else(|| AppError::SyncInProgress(city_id.to_string()))?;

        tracing::info!(city = city_id, "Starting sync run");

        self.index.ensure_collection().await?;

        let mut state = self.state.load(city_id);
        let sources = load_city_sources(&self.city_dir, city_id)?;

        let mut report = SyncReport {
            city_id: city_id.to_string(),
            sources_total: sources.len(),
            sources_updated: 0,
            sources_skipped: 0,
            chunks_upserted: 0,
            errors: Vec::new(),
        };

        let now = Utc::now().to_rfc3339();

        for source in &sources {
            let uri = source.uri.trim();
            if uri.is_empty() {
                continue;
            }

            match self.sync_source(city_id, uri, &mut state, &now).await {
                Ok(SourceOutcome::Skipped) => report.sources_skipped += 1,
                Ok(SourceOutcome::Updated { chunks }) => {
                    report.sources_updated += 1;
                    report.chunks_upserted += chunks;
                }
                Err(e) => {
                    tracing::warn!(city = city_id, uri, error = %e, "Source sync failed");
                    report.errors.push(SyncError {
                        uri: uri.to_string(),
                        error: truncate_chars(&e.to_string(), MAX_ERROR_CHARS),
                    });
                }
            }
        }

        // One write for the whole run; failed sources kept their old hash.
        self.state.save(city_id, &state)?;

        tracing::info!(
            city = city_id,
            updated = report.sources_updated,
            skipped = report.sources_skipped,
            chunks = report.chunks_upserted,
            errors = report.errors.len(),
            "Sync run finished"
        );

        Ok(report)
    }

    async fn sync_source(
        &self,
        city_id: &str,
        uri: &str,
        state: &mut HashMap<String, String>,
        now: &str,
    ) -> AppResult<SourceOutcome> {
        let (raw, content_type) = self.fetcher.fetch(uri).await?;
        let content_hash = sha256_hex(&raw);

        if state.get(uri) == Some(&content_hash) {
            tracing::debug!(uri, "Content unchanged, skipping");
            return Ok(SourceOutcome::Skipped);
        }

        let (title, text) = extract_text(uri, &raw, &content_type);
        let chunks = chunk_text(&text, DEFAULT_MAX_WORDS, DEFAULT_OVERLAP);

        if chunks.is_empty() {
            // Record the hash anyway so an empty page is not refetched into
            // extraction on every run.
            state.insert(uri.to_string(), content_hash);
            return Ok(SourceOutcome::Skipped);
        }

        // Replace the document's points as a unit; a shrinking document must
        // not leave stale chunks behind.
        self.index.delete_where(city_id, uri).await?;

        let doc_id = sha256_hex(uri.as_bytes());
        let mut points = Vec::with_capacity(chunks.len());

        for (idx, chunk) in chunks.iter().enumerate() {
            let vector = self.embedder.embed(chunk).await?;
            points.push(IndexedPoint {
                id: point_id(city_id, uri, idx),
                vector,
                payload: PointPayload {
                    city_id: city_id.to_string(),
                    doc_id: doc_id.clone(),
                    chunk_id: format!("{}#{}", uri, idx),
                    chunk_index: idx as u32,
                    uri: uri.to_string(),
                    title: title.clone(),
                    text: chunk.clone(),
                    content_hash: content_hash.clone(),
                    updated_at: now.to_string(),
                },
            });
        }

        let chunk_count = points.len();
        self.index.upsert(&points).await?;
        state.insert(uri.to_string(), content_hash);

        tracing::debug!(uri, chunks = chunk_count, "Source re-ingested");
        Ok(SourceOutcome::Updated {
            chunks: chunk_count,
        })
    }

    #[cfg(test)]
    fn locks(&self) -> &SyncLocks {
        &self.locks
    }
}

/// Deterministic point id for `(city_id, uri, chunk_index)`.
///
/// UUIDv5 over the joined tuple: re-ingesting an unchanged chunk produces
/// the identical id, making the upsert idempotent.
fn point_id(city_id: &str, uri: &str, chunk_index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{}:{}:{}", city_id, uri, chunk_index).as_bytes(),
    )
    .to_string()
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
