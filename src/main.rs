mod cli;
mod engine;
mod logger;
mod model;
mod summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let report = cli::run(args).await?;

    // Partial failures are reported in the summary; reflect them in the exit
    // code for scripted callers.
    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
