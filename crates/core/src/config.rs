//! Configuration management for Civica.
//!
//! Configuration is merged from three layers, weakest first:
//! - Built-in defaults
//! - An optional YAML config file (`civica.yaml`)
//! - Environment variables (`CIVICA_*`, `RUST_LOG`, `NO_COLOR`)
//!
//! CLI flags are applied last via [`AppConfig::with_overrides`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Main application configuration.
///
/// Holds everything the sync engine and the query pipeline need: data
/// directories, external service endpoints, and the guardrail thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding per-city configuration (`<city_dir>/<city>/sources.yaml`)
    pub city_dir: PathBuf,

    /// Directory holding per-city sync state and the analytics event log
    pub state_dir: PathBuf,

    /// Optional config file path
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Vector index backend ("qdrant" or "memory")
    pub vector_backend: String,

    /// Qdrant HTTP endpoint
    pub qdrant_url: String,

    /// Qdrant collection name
    pub qdrant_collection: String,

    /// Embedding vector dimension
    pub vector_size: usize,

    /// Ollama HTTP endpoint (generation and embeddings)
    pub ollama_url: String,

    /// Generation model identifier
    pub ollama_model: String,

    /// Timeout for generation calls, in seconds
    pub ollama_timeout_secs: u64,

    /// Embedding provider name ("ollama" or "hash")
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Number of chunks retrieved per query
    pub retrieval_top_k: usize,

    /// Minimum top-result similarity before refusing with low_confidence
    pub similarity_threshold: f32,

    /// Minimum query-keyword coverage before refusing with low_coverage
    pub coverage_threshold: f32,

    /// Queries with fewer keywords than this pass the coverage check trivially
    pub min_keyword_count: usize,

    /// Sampling temperature for answer generation
    pub generation_temperature: f32,

    /// Output token budget for answer generation
    pub generation_max_tokens: u32,

    /// Timeout for source fetches, in seconds
    pub fetch_timeout_secs: u64,

    /// Log level override
    #[serde(skip)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[serde(skip)]
    pub no_color: bool,
}

/// Subset of fields accepted from the YAML config file.
///
/// Every field is optional; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    city_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    vector_backend: Option<String>,
    qdrant_url: Option<String>,
    qdrant_collection: Option<String>,
    vector_size: Option<usize>,
    ollama_url: Option<String>,
    ollama_model: Option<String>,
    ollama_timeout_secs: Option<u64>,
    embedding_provider: Option<String>,
    embedding_model: Option<String>,
    retrieval_top_k: Option<usize>,
    similarity_threshold: Option<f32>,
    coverage_threshold: Option<f32>,
    min_keyword_count: Option<usize>,
    generation_temperature: Option<f32>,
    generation_max_tokens: Option<u32>,
    fetch_timeout_secs: Option<u64>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            city_dir: PathBuf::from("./cities"),
            state_dir: PathBuf::from("./data/state"),
            config_file: None,
            vector_backend: "qdrant".to_string(),
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_collection: "civica".to_string(),
            vector_size: 384,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "phi3:mini".to_string(),
            ollama_timeout_secs: 45,
            embedding_provider: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            retrieval_top_k: 8,
            similarity_threshold: 0.35,
            coverage_threshold: 0.34,
            min_keyword_count: 2,
            generation_temperature: 0.1,
            generation_max_tokens: 120,
            fetch_timeout_secs: 20,
            log_level: None,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config file, and environment.
    ///
    /// Environment variables:
    /// - `CIVICA_CONFIG`: Path to the YAML config file
    /// - `CIVICA_CITY_DIR`: Per-city configuration directory
    /// - `CIVICA_STATE_DIR`: Sync state / analytics directory
    /// - `CIVICA_QDRANT_URL`, `CIVICA_QDRANT_COLLECTION`
    /// - `CIVICA_OLLAMA_URL`, `CIVICA_OLLAMA_MODEL`
    /// - `CIVICA_EMBEDDING_PROVIDER`, `CIVICA_EMBEDDING_MODEL`
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(config_file) = std::env::var("CIVICA_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("civica.yaml"));

        if config_path.exists() {
            config.merge_yaml(&config_path)?;
        }

        // Environment variables override the config file.
        if let Ok(dir) = std::env::var("CIVICA_CITY_DIR") {
            config.city_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CIVICA_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("CIVICA_QDRANT_URL") {
            config.qdrant_url = url;
        }
        if let Ok(collection) = std::env::var("CIVICA_QDRANT_COLLECTION") {
            config.qdrant_collection = collection;
        }
        if let Ok(url) = std::env::var("CIVICA_OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Ok(model) = std::env::var("CIVICA_OLLAMA_MODEL") {
            config.ollama_model = model;
        }
        if let Ok(provider) = std::env::var("CIVICA_EMBEDDING_PROVIDER") {
            config.embedding_provider = provider;
        }
        if let Ok(model) = std::env::var("CIVICA_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        config.log_level = std::env::var("RUST_LOG").ok();

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &PathBuf) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        if let Some(v) = file.city_dir {
            self.city_dir = v;
        }
        if let Some(v) = file.state_dir {
            self.state_dir = v;
        }
        if let Some(v) = file.vector_backend {
            self.vector_backend = v;
        }
        if let Some(v) = file.qdrant_url {
            self.qdrant_url = v;
        }
        if let Some(v) = file.qdrant_collection {
            self.qdrant_collection = v;
        }
        if let Some(v) = file.vector_size {
            self.vector_size = v;
        }
        if let Some(v) = file.ollama_url {
            self.ollama_url = v;
        }
        if let Some(v) = file.ollama_model {
            self.ollama_model = v;
        }
        if let Some(v) = file.ollama_timeout_secs {
            self.ollama_timeout_secs = v;
        }
        if let Some(v) = file.embedding_provider {
            self.embedding_provider = v;
        }
        if let Some(v) = file.embedding_model {
            self.embedding_model = v;
        }
        if let Some(v) = file.retrieval_top_k {
            self.retrieval_top_k = v;
        }
        if let Some(v) = file.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = file.coverage_threshold {
            self.coverage_threshold = v;
        }
        if let Some(v) = file.min_keyword_count {
            self.min_keyword_count = v;
        }
        if let Some(v) = file.generation_temperature {
            self.generation_temperature = v;
        }
        if let Some(v) = file.generation_max_tokens {
            self.generation_max_tokens = v;
        }
        if let Some(v) = file.fetch_timeout_secs {
            self.fetch_timeout_secs = v;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }

        Ok(())
    }

    /// Apply CLI overrides, giving flags precedence over everything else.
    pub fn with_overrides(
        mut self,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose && self.log_level.is_none() {
            self.log_level = Some("debug".to_string());
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Ensure the state directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        if !self.state_dir.exists() {
            std::fs::create_dir_all(&self.state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create state directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Path to the analytics event log.
    pub fn analytics_path(&self) -> PathBuf {
        self.state_dir.join("analytics_events.jsonl")
    }

    /// Validate threshold sanity.
    pub fn validate(&self) -> AppResult<()> {
        if self.vector_size == 0 {
            return Err(AppError::Config("vector_size must be non-zero".to_string()));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AppError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }

        if !(0.0..=1.0).contains(&self.coverage_threshold) {
            return Err(AppError::Config(format!(
                "coverage_threshold must be within [0, 1], got {}",
                self.coverage_threshold
            )));
        }

        if self.retrieval_top_k == 0 {
            return Err(AppError::Config(
                "retrieval_top_k must be at least 1".to_string(),
            ));
        }

        let known_providers = ["ollama", "hash"];
        if !known_providers.contains(&self.embedding_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding_provider,
                known_providers.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval_top_k, 8);
        assert_eq!(config.vector_size, 384);
        assert!((config.similarity_threshold - 0.35).abs() < f32::EPSILON);
        assert!(!config.no_color);
    }

    #[test]
    fn test_validate_defaults() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_threshold() {
        let mut config = AppConfig::default();
        config.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_embedding_provider() {
        let mut config = AppConfig::default();
        config.embedding_provider = "magic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_yaml_overrides_subset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "qdrant_collection: test_cities\nretrieval_top_k: 4\nlogging:\n  level: warn"
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.merge_yaml(&file.path().to_path_buf()).unwrap();

        assert_eq!(config.qdrant_collection, "test_cities");
        assert_eq!(config.retrieval_top_k, 4);
        assert_eq!(config.log_level, Some("warn".to_string()));
        // Untouched fields keep defaults.
        assert_eq!(config.ollama_model, "phi3:mini");
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(None, None, true, true);
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert!(config.no_color);
    }

    #[test]
    fn test_analytics_path_under_state_dir() {
        let config = AppConfig::default();
        assert!(config.analytics_path().ends_with("analytics_events.jsonl"));
    }
}
