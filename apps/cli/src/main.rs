//! `gregory-build`: build pipeline for the Gregory MS website.
//!
//! Pulls the latest site sources, refreshes articles, trials and categories
//! from the Gregory API, writes the derived content, and runs the site
//! generator.

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
