//! `stockledger account create` and `instrument create`: seed rows written
//! straight to Postgres, outside any lease.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use super::output::{self, OutputMode};
use super::{AccountCommands, Commands, InstrumentCommands};
use crate::adapters::PostgresStore;
use crate::domain::Role;
use crate::error::TradeRejection;
use crate::trading::pricing::PRICE_SCALE;

#[derive(Debug, Serialize, Tabled)]
pub struct CreatedRow {
    pub kind: String,
    pub id: i64,
    pub name: String,
}

/// Trimmed, non-empty username with a non-negative opening balance
pub(crate) fn check_account(username: &str, balance: Decimal) -> anyhow::Result<(String, Decimal)> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("username must not be empty");
    }
    if balance < Decimal::ZERO {
        anyhow::bail!("opening balance must not be negative, got {}", balance);
    }
    Ok((username.to_string(), balance))
}

/// Upper-cased symbol and a price at or above `floor`, rounded to the ledger scale
pub(crate) fn check_instrument(
    symbol: &str,
    price: Decimal,
    floor: Decimal,
) -> anyhow::Result<(String, Decimal)> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        anyhow::bail!("symbol must not be empty");
    }
    let price = price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if price < floor {
        return Err(TradeRejection::InvalidPrice { price, floor }.into());
    }
    Ok((symbol, price))
}

pub async fn run(
    cmd: &Commands,
    store: &PostgresStore,
    price_floor: Decimal,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let row = match cmd {
        Commands::Account {
            action:
                AccountCommands::Create {
                    username,
                    balance,
                    role,
                },
        } => {
            let (username, balance) = check_account(username, *balance)?;
            let role = Role::from(*role);
            let id = store.create_account(&username, balance, role).await?;
            info!("Created {} {} ({})", role, id, username);
            CreatedRow {
                kind: format!("account ({})", role),
                id: id.get(),
                name: username,
            }
        }
        Commands::Instrument {
            action: InstrumentCommands::Create { symbol, name, price },
        } => {
            let (symbol, price) = check_instrument(symbol, *price, price_floor)?;
            let id = store.create_instrument(&symbol, name.trim(), price).await?;
            info!("Listed {} as {} at {}", symbol, id, price);
            CreatedRow {
                kind: "instrument".to_string(),
                id: id.get(),
                name: symbol,
            }
        }
        _ => anyhow::bail!("not a setup command"),
    };
    output::print_item(&row, mode)
}
