//! Civica CLI
//!
//! Main entry point for the civica command-line tool: sync a city's
//! knowledge base, ask questions against it, and check service health.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, FeedbackCommand, StatusCommand, SyncCommand};
use civica_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Civica CLI - municipal knowledge assistant
#[derive(Parser, Debug)]
#[command(name = "civica")]
#[command(about = "Grounded question answering over municipal documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "CIVICA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync a city's sources into the vector index
    Sync(SyncCommand),

    /// Ask a question scoped to one city
    Ask(AskCommand),

    /// Record feedback on an answered query
    Feedback(FeedbackCommand),

    /// Show a city's configuration and index health
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    let config = config.with_overrides(cli.config, cli.log_level, cli.verbose, cli.no_color);

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;
    config.validate()?;

    tracing::debug!("City dir: {:?}", config.city_dir);
    tracing::debug!("Vector backend: {}", config.vector_backend);
    tracing::debug!("Model: {}", config.ollama_model);

    let command_name = match &cli.command {
        Commands::Sync(_) => "sync",
        Commands::Ask(_) => "ask",
        Commands::Feedback(_) => "feedback",
        Commands::Status(_) => "status",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Sync(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Feedback(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
    };

    if let Err(e) = &result {
        tracing::error!("Command failed: {}", e);
    }

    result
}
