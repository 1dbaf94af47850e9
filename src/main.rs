// src/main.rs
use std::process::ExitCode;

use clap::Parser;

use edgar_pipeline::commands::{self, Cli};
use edgar_pipeline::utils;
use edgar_pipeline::AppError;

#[tokio::main]
async fn main() -> Result<ExitCode, AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI arguments and dispatch to the selected stage
    let cli = Cli::parse();
    commands::run(cli).await
}
