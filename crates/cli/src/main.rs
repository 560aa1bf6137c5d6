//! ESG Q&A CLI
//!
//! Main entry point for the `esg` command-line tool: ask cited questions
//! about corporate sustainability reports and news, inspect routing, and
//! manage the local evidence index.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, CorpusCommand, RouteCommand};
use esg_core::{
    config::AppConfig,
    logging::{self, LogFormat},
    AppError, AppResult,
};
use std::path::PathBuf;

/// ESG question answering over sustainability reports and news
#[derive(Parser, Debug)]
#[command(name = "esg")]
#[command(about = "Cited answers about corporate ESG data and news", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "ESG_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "ESG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log line format (pretty, json)
    #[arg(long, global = true, env = "ESG_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama, openai)
    #[arg(short, long, global = true, env = "ESG_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "ESG_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask an ESG question and get a cited answer
    Ask(AskCommand),

    /// Show which retrieval mode a question would use
    Route(RouteCommand),

    /// Load and inspect the evidence corpus
    Corpus(CorpusCommand),
}

fn parse_log_format(s: &str) -> AppResult<LogFormat> {
    match s.trim().to_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(AppError::Config(format!(
            "Unknown log format: {}. Supported: pretty, json",
            other
        ))),
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Environment and the default .esg/config.yaml first
    let mut config = AppConfig::load()?;

    // An explicit --config replaces whatever the environment pointed at
    if let Some(path) = cli.config.as_ref() {
        if config.config_file.as_ref() != Some(path) {
            config = config.merge_yaml(path)?;
        }
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

    logging::init_logging(
        config.log_level.as_deref(),
        config.no_color,
        parse_log_format(&cli.log_format)?,
    )?;

    tracing::info!("ESG CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_esg_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Route(_) => "route",
        Commands::Corpus(_) => "corpus",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Route(cmd) => cmd.execute(&config).await,
        Commands::Corpus(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!(retryable = e.is_retryable(), "Command failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_mode_and_session() {
        let cli = Cli::try_parse_from([
            "esg", "ask", "台積電 2023 碳排放", "--mode", "data", "--session", "s1", "--json",
        ])
        .unwrap();
        let Commands::Ask(ask) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(ask.question, "台積電 2023 碳排放");
        assert_eq!(ask.mode.as_deref(), Some("data"));
        assert_eq!(ask.session.as_deref(), Some("s1"));
        assert!(ask.json);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(parse_log_format("JSON").unwrap(), LogFormat::Json);
        assert_eq!(parse_log_format("pretty").unwrap(), LogFormat::Pretty);
        assert!(parse_log_format("xml").is_err());
    }
}
