//! Per-city source manifests.
//!
//! Each city directory carries a `sources.yaml` listing the documents to
//! ingest. The manifest is owned by city administration tooling; this module
//! only reads it.

use civica_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One configured source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Source kind; only "url" is used today
    #[serde(rename = "type", default = "default_source_type")]
    pub source_type: String,

    /// Document URI
    pub uri: String,
}

fn default_source_type() -> String {
    "url".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct CityManifest {
    #[serde(default)]
    sources: Vec<SourceRecord>,
}

/// Path of a city's directory.
pub fn city_path(city_dir: &Path, city_id: &str) -> PathBuf {
    city_dir.join(city_id)
}

/// Whether a city has been set up at all.
pub fn city_exists(city_dir: &Path, city_id: &str) -> bool {
    city_path(city_dir, city_id).exists()
}

/// Load a city's configured sources. A missing manifest yields an empty
/// list; a malformed one is an error.
pub fn load_city_sources(city_dir: &Path, city_id: &str) -> AppResult<Vec<SourceRecord>> {
    let manifest_path = city_path(city_dir, city_id).join("sources.yaml");
    if !manifest_path.exists() {
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(&manifest_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read sources manifest {:?}: {}",
            manifest_path, e
        ))
    })?;

    let manifest: CityManifest = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Config(format!(
            "Failed to parse sources manifest {:?}: {}",
            manifest_path, e
        ))
    })?;

    Ok(manifest.sources)
}
