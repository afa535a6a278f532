//! briefwire CLI, the daily AI news briefing pipeline.
//!
//! Runs the checkpointed scrape → extract → enrich → publish pipeline for a
//! run date and queries the finished article corpus.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
