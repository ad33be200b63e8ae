use anyhow::Result;
use clap::Parser;
use coinvault::cli::Cli;
use coinvault::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.run().await
}
