use clap::Parser;
use stockledger::cli::Cli;
use stockledger::error::Result;

mod main_dispatch;
mod main_runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    main_dispatch::run(&cli).await
}
