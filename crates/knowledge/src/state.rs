//! Per-city sync state.
//!
//! One JSON document per city mapping source URI to the content hash seen at
//! the last successful ingestion. This is the sole de-duplication memory:
//! a URI is re-ingested only when its current hash differs from the stored
//! one. The whole document is read at the start of a sync run and written
//! back once at the end.

use civica_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Loads and persists per-city uri→hash maps.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    state_dir: PathBuf,
}

impl SyncStateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn state_path(&self, city_id: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", city_id))
    }

    /// Load a city's state. Missing or unreadable state yields an empty map
    /// (every source will look new and be re-ingested, which is safe).
    pub fn load(&self, city_id: &str) -> HashMap<String, String> {
        let path = self.state_path(city_id);
        if !path.exists() {
            return HashMap::new();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Corrupt sync state, starting fresh");
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Unreadable sync state, starting fresh");
                HashMap::new()
            }
        }
    }

    /// Persist a city's state, replacing the whole document.
    pub fn save(&self, city_id: &str, state: &HashMap<String, String>) -> AppResult<()> {
        std::fs::create_dir_all(&self.state_dir).map_err(|e| {
            AppError::Config(format!(
                "Failed to create state directory {:?}: {}",
                self.state_dir, e
            ))
        })?;

        let contents = serde_json::to_string_pretty(state)?;
        std::fs::write(self.state_path(city_id), contents)?;

        tracing::debug!(city = city_id, entries = state.len(), "Saved sync state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path());
        assert!(store.load("springfield").is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path().join("state"));

        let mut state = HashMap::new();
        state.insert("https://s.test/a".to_string(), "hash-a".to_string());
        state.insert("https://s.test/b".to_string(), "hash-b".to_string());

        store.save("springfield", &state).unwrap();
        let loaded = store.load("springfield");

        assert_eq!(loaded, state);
    }

    #[test]
    fn test_corrupt_state_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path());
        std::fs::write(dir.path().join("springfield.json"), "{ not json").unwrap();

        assert!(store.load("springfield").is_empty());
    }

    #[test]
    fn test_state_is_per_city() {
        let dir = TempDir::new().unwrap();
        let store = SyncStateStore::new(dir.path());

        let mut state = HashMap::new();
        state.insert("https://s.test/a".to_string(), "hash-a".to_string());
        store.save("springfield", &state).unwrap();

        assert!(store.load("shelbyville").is_empty());
        assert_eq!(store.load("springfield").len(), 1);
    }
}
