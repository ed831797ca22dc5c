//! crashgate CLI - inspect and manage persisted crash reports
//!
//! Provides commands for:
//! - Listing, viewing and deleting stored reports
//! - Showing minidumps waiting to be associated or sent
//! - Viewing, validating and creating the configuration file

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crashgate_core::config::CrashesConfig;

mod commands;
mod output;

use commands::{config::ConfigCommand, minidumps::MinidumpsCommand, reports::ReportsCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "crashgate", version, about = "Crash report storage inspector")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage stored crash reports
    #[command(subcommand)]
    Reports(ReportsCommand),
    /// Show minidumps found in the storage directory
    Minidumps(MinidumpsCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(CrashesConfig::default_path);
    let config = CrashesConfig::load_or_default(&config_path);

    // Setup tracing
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Reports(cmd) => cmd.execute(&config, format).await,
        Commands::Minidumps(cmd) => cmd.execute(&config, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
