//! Marquee CLI
//!
//! Main entry point for the marquee command-line tool.
//! Builds the semantic movie index, queries it, and serves it over HTTP.

mod commands;
mod server;

use clap::{Parser, Subcommand};
use commands::{BuildCommand, SearchCommand, ServeCommand, StatsCommand};
use marquee_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Marquee - semantic search over movie overviews
#[derive(Parser, Debug)]
#[command(name = "marquee")]
#[command(about = "Semantic search over movie overviews", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "MARQUEE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "MARQUEE_CONFIG")]
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

    /// Embedding provider (ollama, mock)
    #[arg(short, long, global = true, env = "MARQUEE_PROVIDER")]
    provider: Option<String>,

    /// Embedding model identifier
    #[arg(short, long, global = true, env = "MARQUEE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the index from the corpus and write the archive
    Build(BuildCommand),

    /// Query the index (interactive when no query is given)
    Search(SearchCommand),

    /// Show archive and corpus statistics
    Stats(StatsCommand),

    /// Serve the search API over HTTP
    Serve(ServeCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.workspace, cli.config)?.with_overrides(
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Marquee CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        "Embedding provider: {} (model: {})",
        config.embedding.provider,
        config.embedding.model
    );

    config.validate()?;

    let command_name = match &cli.command {
        Commands::Build(_) => "build",
        Commands::Search(_) => "search",
        Commands::Stats(_) => "stats",
        Commands::Serve(_) => "serve",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Build(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
