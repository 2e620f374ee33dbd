//! storypub CLI: publish markdown user stories to ServiceNow.
//!
//! Reads a story file, finds a matching `rm_story` record by title, and
//! creates or updates it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Credentials may live in a local .env file.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
