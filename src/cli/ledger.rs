//! `stockledger` trading and admin commands against a live ledger.

use rust_decimal::Decimal;
use serde::Serialize;
use tabled::Tabled;

use super::output::{self, OutputMode};
use super::{Commands, InstrumentCommands};
use crate::domain::{
    AccountId, Compensation, Instrument, InstrumentId, Order, OrderId, OrderSide,
};
use crate::trading::{Ledger, PortfolioSummary, PositionView, PriceChange};

#[derive(Debug, Serialize, Tabled)]
pub struct OrderRow {
    pub id: String,
    pub side: String,
    pub instrument: i64,
    pub quantity: i64,
    pub price: Decimal,
    pub status: String,
    pub created_at: String,
    pub error: String,
}

impl From<&Order> for OrderRow {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id.map(|id| id.get().to_string()).unwrap_or_default(),
            side: o.side.to_string(),
            instrument: o.instrument_id.get(),
            quantity: o.quantity,
            price: o.price,
            status: o.status.to_string(),
            created_at: o.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            error: o.error.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct InstrumentRow {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub status: String,
}

impl From<&Instrument> for InstrumentRow {
    fn from(i: &Instrument) -> Self {
        let status = match (&i.suspended, &i.suspension_reason) {
            (false, _) => "trading".to_string(),
            (true, Some(reason)) => format!("suspended: {reason}"),
            (true, None) => "suspended".to_string(),
        };
        Self {
            id: i.id.get(),
            symbol: i.symbol.clone(),
            name: i.name.clone(),
            price: i.price.round_dp(4),
            status,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PositionRow {
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: Decimal,
    pub price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
}

impl From<&PositionView> for PositionRow {
    fn from(p: &PositionView) -> Self {
        Self {
            symbol: p.symbol.clone(),
            quantity: p.quantity,
            avg_cost: p.avg_cost.round_dp(4),
            price: p.price.round_dp(4),
            market_value: p.market_value.round_dp(2),
            unrealized_pnl: p.unrealized_pnl.round_dp(2),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct CompensationRow {
    pub id: String,
    pub order: i64,
    pub account: i64,
    pub admin: i64,
    pub amount: Decimal,
    pub executed: bool,
    pub reason: String,
}

impl From<&Compensation> for CompensationRow {
    fn from(c: &Compensation) -> Self {
        Self {
            id: c.id.map(|id| id.get().to_string()).unwrap_or_default(),
            order: c.order_id.get(),
            account: c.account_id.get(),
            admin: c.admin_id.get(),
            amount: c.amount,
            executed: c.rollback_executed,
            reason: c.reason.clone(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PriceChangeRow {
    pub symbol: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub change_pct: String,
}

impl From<&PriceChange> for PriceChangeRow {
    fn from(c: &PriceChange) -> Self {
        Self {
            symbol: c.symbol.clone(),
            old_price: c.old_price,
            new_price: c.new_price,
            change_pct: format!("{}%", c.change_pct.normalize()),
        }
    }
}

pub(crate) fn print_portfolio(summary: &PortfolioSummary, mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    output::print_kv("Account", &format!("{} ({})", summary.username, summary.account_id));
    output::print_kv("Cash", &summary.balance.round_dp(2).to_string());
    let rows: Vec<PositionRow> = summary.positions.iter().map(PositionRow::from).collect();
    output::print_items(&rows, mode)?;
    output::print_kv("Market value", &summary.market_value.round_dp(2).to_string());
    output::print_kv("Unrealized PnL", &summary.unrealized_pnl.round_dp(2).to_string());
    output::print_kv("Equity", &summary.equity.round_dp(2).to_string());
    Ok(())
}

/// Run one ledger command. `Migrate`, `Demo` and setup commands are handled
/// by the caller.
pub async fn run(cmd: &Commands, ledger: &Ledger, mode: OutputMode) -> anyhow::Result<()> {
    match cmd {
        Commands::Buy {
            account,
            instrument,
            quantity,
        }
        | Commands::Sell {
            account,
            instrument,
            quantity,
        } => {
            let side = if matches!(cmd, Commands::Buy { .. }) {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            let order = ledger
                .engine
                .execute(AccountId(*account), InstrumentId(*instrument), side, *quantity)
                .await?;
            output::print_item(&OrderRow::from(&order), mode)?;
        }
        Commands::Cancel {
            order,
            admin,
            reason,
        } => {
            let compensation = ledger
                .compensation
                .cancel(OrderId(*order), AccountId(*admin), reason)
                .await?;
            output::print_item(&CompensationRow::from(&compensation), mode)?;
        }
        Commands::Suspend {
            instrument,
            admin,
            reason,
        } => {
            let updated = ledger
                .admin
                .suspend(InstrumentId(*instrument), AccountId(*admin), reason)
                .await?;
            output::print_success(&format!("{} suspended", updated.symbol));
        }
        Commands::Resume { instrument, admin } => {
            let updated = ledger
                .admin
                .resume(InstrumentId(*instrument), AccountId(*admin))
                .await?;
            output::print_success(&format!("{} resumed", updated.symbol));
        }
        Commands::SetPrice {
            instrument,
            price,
            admin,
            reason,
        } => {
            let change = ledger
                .admin
                .set_price(InstrumentId(*instrument), AccountId(*admin), *price, reason)
                .await?;
            output::print_item(&PriceChangeRow::from(&change), mode)?;
        }
        Commands::Portfolio { account } => {
            let summary = ledger.portfolio.portfolio(AccountId(*account)).await?;
            print_portfolio(&summary, mode)?;
        }
        Commands::Orders { account, limit } => {
            let orders = ledger
                .portfolio
                .recent_orders(AccountId(*account), *limit)
                .await?;
            let rows: Vec<OrderRow> = orders.iter().map(OrderRow::from).collect();
            output::print_items(&rows, mode)?;
        }
        Commands::Instruments => {
            let instruments = ledger.market.instruments().await?;
            let rows: Vec<InstrumentRow> = instruments.iter().map(InstrumentRow::from).collect();
            output::print_items(&rows, mode)?;
        }
        Commands::Instrument {
            action: InstrumentCommands::Show { symbol },
        } => {
            let instrument = ledger.market.instrument(symbol).await?;
            output::print_item(&InstrumentRow::from(&instrument), mode)?;
        }
        Commands::Migrate
        | Commands::Demo
        | Commands::Account { .. }
        | Commands::Instrument {
            action: InstrumentCommands::Create { .. },
        } => {
            anyhow::bail!("command must be run by the dispatcher");
        }
    }
    Ok(())
}
