mod copy;
mod db;

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::copy::CopyArgs;

#[derive(Debug, Parser)]
#[command(name = "feedcopy")]
#[command(about = "Copy a feed (and related data) from production to the local database")]
struct Cli {
    /// Print the full error chain on failure
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Copy one feed, its provider profiles and recent posts
    Copy(CopyArgs),
    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check connectivity to the source and target databases
    Ping,
    /// Apply pending migrations to the target database
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if verbose {
                eprintln!("error: {err:?}");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let config = feedcopy_core::load_app_config().context("failed to load configuration")?;
    init_tracing(&config.log_level);
    tracing::debug!(?config, "configuration loaded");

    match command {
        Commands::Copy(args) => copy::run_copy(&config, &args).await,
        Commands::Db { command } => match command {
            DbCommands::Ping => db::run_ping(&config).await,
            DbCommands::Migrate => db::run_migrate(&config).await,
        },
    }
}

/// `RUST_LOG` wins over `FEEDCOPY_LOG_LEVEL`. Logs go to stderr so stdout
/// carries only the outcome.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
