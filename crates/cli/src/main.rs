//! agentloop CLI: the main entry point.
//!
//! Commands:
//! - `replay`  : Run a session against a recorded model-response script
//! - `tools`   : Show which tools each permission level exposes
//! - `config`  : Show, locate or validate the configuration
//! - `status`  : Show system status

use agentloop_core::permission::PermissionLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "agentloop",
    about = "agentloop: permission-gated tool-use loop for LLM agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON (logs on stderr, results on stdout)
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session against a recorded model-response script
    Replay {
        /// Path to the JSON script
        script: PathBuf,

        /// Permission level for the session (overrides script and config)
        #[arg(short, long)]
        level: Option<PermissionLevel>,

        /// Step budget (overrides config)
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// Show the tools allowed at each permission level
    Tools {
        /// Only show this level
        #[arg(short, long)]
        level: Option<PermissionLevel>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Replay {
            script,
            level,
            max_steps,
        } => commands::replay::run(&script, level, max_steps, cli.json).await?,
        Commands::Tools { level } => commands::tools::run(level, cli.json).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
