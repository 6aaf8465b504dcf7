use std::sync::Arc;

use stockledger::adapters::PostgresStore;
use stockledger::cli::output::{self, OutputMode};
use stockledger::cli::{self, Cli, Commands};
use stockledger::config::AppConfig;
use stockledger::error::{LedgerError, Result};
use stockledger::trading::Ledger;
use tracing::info;

pub(crate) async fn run(cli: &Cli) -> Result<()> {
    let config = AppConfig::load_from(&cli.config)?;
    if let Err(problems) = config.validate() {
        return Err(LedgerError::Internal(format!(
            "invalid configuration: {}",
            problems.join("; ")
        )));
    }
    let mode = OutputMode::from_json_flag(cli.json);

    match &cli.command {
        Commands::Demo => {
            crate::main_runtime::init_logging_simple();
            cli::demo::run(&config, mode).await?;
        }
        Commands::Migrate => {
            crate::main_runtime::init_logging(&config.logging);
            let store = connect(&config).await?;
            store.migrate().await?;
            output::print_success("Migrations applied");
        }
        command if command.is_setup() => {
            crate::main_runtime::init_logging(&config.logging);
            let store = connect(&config).await?;
            if let Err(e) =
                cli::setup::run(command, &store, config.pricing.price_floor, mode).await
            {
                output::print_error(&format!("{e}"));
                return Err(e.into());
            }
        }
        command => {
            crate::main_runtime::init_logging(&config.logging);
            let store = connect(&config).await?;
            let ledger = Ledger::new(Arc::new(store), &config);
            if let Err(e) = cli::ledger::run(command, &ledger, mode).await {
                output::print_error(&format!("{e}"));
                return Err(e.into());
            }
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> Result<PostgresStore> {
    let store =
        PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    info!(
        "Using database with {} max connections",
        config.database.max_connections
    );
    Ok(store)
}
