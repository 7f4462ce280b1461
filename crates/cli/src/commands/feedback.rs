//! The `feedback` command: record user feedback for an answered query.

use clap::Args;
use civica_core::{AppConfig, AppError, AppResult};
use civica_knowledge::{AnalyticsSink, FeedbackEvent, FeedbackReason, JsonlAnalytics};
use serde_json::json;

/// Record feedback on a previously answered query.
#[derive(Args, Debug)]
pub struct FeedbackCommand {
    /// City identifier
    pub city_id: String,

    /// Query identifier from the answer's metadata
    pub query_id: String,

    /// Whether the answer was helpful
    #[arg(long)]
    pub helpful: bool,

    /// Structured reason (missing_info, incorrect, unclear, outdated, other)
    #[arg(long)]
    pub reason: Option<String>,

    /// Request escalation to a human
    #[arg(long)]
    pub escalate: bool,

    /// Free-form comment
    #[arg(long)]
    pub comment: Option<String>,

    /// Caller session identifier
    #[arg(long)]
    pub session: Option<String>,
}

impl FeedbackCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        config.ensure_state_dir()?;

        let reason = match self.reason.as_deref() {
            None => None,
            Some(raw) => Some(parse_reason(raw)?),
        };

        let sink = JsonlAnalytics::new(config.analytics_path());
        let feedback_id = sink.record_feedback(&FeedbackEvent {
            city_id: self.city_id.clone(),
            query_id: self.query_id.clone(),
            session_id: self.session.clone(),
            helpful: self.helpful,
            reason,
            escalation_requested: self.escalate,
            comment: self.comment.clone(),
        })?;

        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": "recorded",
                "feedback_id": feedback_id,
            }))?
        );
        Ok(())
    }
}

fn parse_reason(raw: &str) -> AppResult<FeedbackReason> {
    match raw {
        "missing_info" => Ok(FeedbackReason::MissingInfo),
        "incorrect" => Ok(FeedbackReason::Incorrect),
        "unclear" => Ok(FeedbackReason::Unclear),
        "outdated" => Ok(FeedbackReason::Outdated),
        "other" => Ok(FeedbackReason::Other),
        _ => Err(AppError::InvalidRequest(format!(
            "Unknown feedback reason: {}",
            raw
        ))),
    }
}
