//! `poboys` conda package server binary

use anyhow::Result;
use clap::Parser;
use poboys_server::{cli::Cli, run_server};

#[tokio::main]
async fn main() -> Result<()> {
    // Held until exit so buffered file logs are flushed
    let _log_guard = poboys_logging::init_subscriber();

    let config = Cli::parse().into_config()?;
    run_server(config).await
}
