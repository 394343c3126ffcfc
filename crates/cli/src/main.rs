//! Coursemate CLI
//!
//! Main entry point for the coursemate command-line tool.
//! Answers questions about courses and professors from review data.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, IngestCommand, PromptsCommand, StatsCommand};
use coursemate_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Coursemate - course and professor Q&A over student reviews
#[derive(Parser, Debug)]
#[command(name = "coursemate")]
#[command(about = "Course and professor Q&A over student reviews", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "COURSEMATE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "COURSEMATE_CONFIG")]
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

    /// LLM provider (ollama, gemini)
    #[arg(short, long, global = true, env = "COURSEMATE_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "COURSEMATE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question about courses or professors
    Ask(AskCommand),

    /// Load course records and reviews into the catalog
    Ingest(IngestCommand),

    /// Show catalog statistics
    Stats(StatsCommand),

    /// List prompt definitions and where they come from
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(path) = cli.config.as_deref() {
        config = config.with_config_file(path)?;
    }

    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    tracing::info!("Coursemate CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_coursemate_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Ingest(_) => "ingest",
        Commands::Stats(_) => "stats",
        Commands::Prompts(_) => "prompts",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Prompts(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
