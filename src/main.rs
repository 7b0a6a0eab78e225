use std::process::ExitCode;

use anyhow::Result;
use aac_normalizer::{cli::Cli, run};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    run(cli).await
}
