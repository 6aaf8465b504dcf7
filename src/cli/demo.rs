//! `stockledger demo` — walk through the ledger's behaviour against an
//! in-memory store. No database needed.

use rust_decimal_macros::dec;
use std::sync::Arc;

use super::ledger::{print_portfolio, CompensationRow, InstrumentRow, OrderRow};
use super::output::{self, OutputMode};
use crate::adapters::MemoryStore;
use crate::config::AppConfig;
use crate::domain::{Account, AccountId, Instrument, InstrumentId, OrderSide, Role};
use crate::trading::Ledger;

const ADMIN: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(2);
const BOB: AccountId = AccountId(3);
const ACME: InstrumentId = InstrumentId(1);
const GLOBEX: InstrumentId = InstrumentId(2);

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .seed_account(Account::new(ADMIN, "admin", dec!(0), Role::Admin))
        .await;
    store
        .seed_account(Account::new(ALICE, "alice", dec!(1000.00), Role::User))
        .await;
    store
        .seed_account(Account::new(BOB, "bob", dec!(2000.00), Role::User))
        .await;
    store
        .seed_instrument(Instrument::new(ACME, "ACME", "Acme Corp", dec!(100.00)))
        .await;
    store
        .seed_instrument(Instrument::new(GLOBEX, "GLBX", "Globex", dec!(100.00)))
        .await;
    store
}

fn step(title: &str) {
    println!();
    println!("== {title}");
}

pub async fn run(config: &AppConfig, mode: OutputMode) -> anyhow::Result<()> {
    let store = seeded_store().await;
    let ledger = Ledger::new(store, config);

    step("alice buys 10 ACME @ 100.00 with 1000.00 cash");
    let order = ledger.engine.execute(ALICE, ACME, OrderSide::Buy, 10).await?;
    output::print_item(&OrderRow::from(&order), mode)?;
    print_portfolio(&ledger.portfolio.portfolio(ALICE).await?, mode)?;

    step("alice tries to sell 15 ACME while holding 10");
    match ledger.engine.execute(ALICE, ACME, OrderSide::Sell, 15).await {
        Ok(order) => output::print_item(&OrderRow::from(&order), mode)?,
        Err(e) => output::print_error(&e.to_string()),
    }

    step("bob sends two concurrent buys of 5 GLBX");
    let (first, second) = tokio::join!(
        ledger.engine.execute(BOB, GLOBEX, OrderSide::Buy, 5),
        ledger.engine.execute(BOB, GLOBEX, OrderSide::Buy, 5),
    );
    let filled: Vec<OrderRow> = [first?, second?].iter().map(OrderRow::from).collect();
    output::print_items(&filled, mode)?;
    print_portfolio(&ledger.portfolio.portfolio(BOB).await?, mode)?;

    step("prices after price impact");
    let instruments = ledger.market.instruments().await?;
    let rows: Vec<InstrumentRow> = instruments.iter().map(InstrumentRow::from).collect();
    output::print_items(&rows, mode)?;

    step("admin cancels alice's order twice");
    let compensation = ledger
        .compensation
        .cancel(
            order.id.ok_or_else(|| anyhow::anyhow!("order was not recorded"))?,
            ADMIN,
            "demo reversal",
        )
        .await?;
    output::print_item(&CompensationRow::from(&compensation), mode)?;
    if let Err(e) = ledger
        .compensation
        .cancel(compensation.order_id, ADMIN, "demo reversal")
        .await
    {
        output::print_error(&e.to_string());
    }
    print_portfolio(&ledger.portfolio.portfolio(ALICE).await?, mode)?;

    step("admin suspends ACME; bob's buy is refused until it resumes");
    ledger.admin.suspend(ACME, ADMIN, "news pending").await?;
    if let Err(e) = ledger.engine.execute(BOB, ACME, OrderSide::Buy, 1).await {
        output::print_error(&e.to_string());
    }
    ledger.admin.resume(ACME, ADMIN).await?;
    let order = ledger.engine.execute(BOB, ACME, OrderSide::Buy, 1).await?;
    output::print_item(&OrderRow::from(&order), mode)?;

    step("order history for bob");
    let rows: Vec<OrderRow> = ledger
        .portfolio
        .recent_orders(BOB, 10)
        .await?
        .iter()
        .map(OrderRow::from)
        .collect();
    output::print_items(&rows, mode)?;

    output::print_success("demo complete");
    Ok(())
}
