//! # opsize: operator resource profiler
//!
//! Runs every operator of a pipeline in its own container, one at a time,
//! and reports the CPU and memory each one should request.

mod cli;
mod console;
mod output;
mod profile;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    profile::execute(cli).await
}
