//! The `status` command: city configuration and index health.

use clap::Args;
use civica_core::{AppConfig, AppError, AppResult};
use civica_knowledge::sources::{city_exists, load_city_sources};
use serde_json::json;

/// Show a city's configuration and vector index health.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// City identifier
    pub city_id: String,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if !city_exists(&config.city_dir, &self.city_id) {
            return Err(AppError::Config(format!(
                "City '{}' is not configured under {:?}",
                self.city_id, config.city_dir
            )));
        }

        let sources = load_city_sources(&config.city_dir, &self.city_id)?;
        let index = super::build_index(config)?;
        let health = index.health().await;

        let status = json!({
            "city_id": self.city_id,
            "sources": sources.len(),
            "vector_collection": health,
        });

        println!("{}", serde_json::to_string_pretty(&status)?);
        Ok(())
    }
}
