//! The `sync` command: ingest a city's configured sources.

use clap::Args;
use civica_core::{AppConfig, AppError, AppResult};
use civica_knowledge::sources::city_exists;

/// Sync a city's sources into the vector index.
#[derive(Args, Debug)]
pub struct SyncCommand {
    /// City identifier (directory name under the city config dir)
    pub city_id: String,
}

impl SyncCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if !city_exists(&config.city_dir, &self.city_id) {
            return Err(AppError::Config(format!(
                "City '{}' is not configured under {:?}",
                self.city_id, config.city_dir
            )));
        }

        config.ensure_state_dir()?;

        let engine = super::build_sync_engine(config)?;
        let report = engine.sync_city(&self.city_id).await?;

        println!("{}", serde_json::to_string_pretty(&report)?);

        if !report.errors.is_empty() {
            tracing::warn!(
                errors = report.errors.len(),
                "Sync finished with source errors"
            );
        }

        Ok(())
    }
}
