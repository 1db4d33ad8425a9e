use anyhow::Result;
use clap::Parser;
use cqlens::cli::Cli;
use cqlens::output;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting cqlens - Commit Queue Insights Tool");
    cli.execute().await?;

    Ok(())
}
