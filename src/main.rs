mod cli;
mod config;
mod error;
mod mining;
mod output;
mod report;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting procmine - Process Mining Analytics");
    cli.execute().await?;

    Ok(())
}
