//! CLI entry point for mediafetch.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod cli;

use app::command_dispatcher;
use app::config_manager::resolve_config;
use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    match run(cli).await {
        Ok(exit) => exit.into(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<app::exit_handler::ProcessExit> {
    let config = resolve_config(&cli.global)?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");
    debug!(
        download_dir = %config.engine.download_dir.display(),
        concurrency = config.engine.concurrency,
        quality = %config.engine.quality,
        "configuration resolved"
    );

    let show_progress = !cli.global.quiet && !cli.global.no_progress && io::stderr().is_terminal();
    command_dispatcher::dispatch(&cli.command, &config, show_progress).await
}
