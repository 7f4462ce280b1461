//! The `ask` command: query one city's knowledge base.

use clap::Args;
use civica_core::{AppConfig, AppResult};
use civica_knowledge::StreamEvent;

/// Ask a question scoped to one city.
#[derive(Args, Debug)]
pub struct AskCommand {
    /// City identifier
    pub city_id: String,

    /// The question to answer
    pub query: String,

    /// Caller session identifier, forwarded into analytics
    #[arg(long)]
    pub session: Option<String>,

    /// Emit incremental events instead of one response
    #[arg(long)]
    pub stream: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        config.ensure_state_dir()?;
        let pipeline = super::build_pipeline(config)?;

        if self.stream {
            let mut events =
                pipeline.stream(&self.city_id, &self.query, self.session.as_deref());

            // One JSON line per event, in arrival order; this stands in for
            // the event-stream transport.
            while let Some(event) = events.recv().await {
                println!("{}", serde_json::to_string(&event)?);
                if matches!(event, StreamEvent::Done { .. } | StreamEvent::Error { .. }) {
                    break;
                }
            }

            return Ok(());
        }

        let response = pipeline
            .answer(&self.city_id, &self.query, self.session.as_deref())
            .await?;

        println!("{}", serde_json::to_string_pretty(&response)?);
        Ok(())
    }
}
