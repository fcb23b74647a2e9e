mod cli;
mod console;
mod run;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::cli::CliArgs;
use crate::console::Console;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let report = run::execute(&args, Console).await?;

    info!(
        entries = report.entries,
        index_rebuilt = report.index_rebuilt,
        transferred = report.transfer.as_ref().map(|s| s.total_completed),
        "done"
    );
    Ok(())
}
