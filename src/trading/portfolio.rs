//! Read-only account views. No lease is taken; results are a best-effort
//! snapshot and may straddle a concurrent trade.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::domain::{AccountId, InstrumentId, Order};
use crate::error::{LedgerError, Result, TradeRejection};
use crate::store::LedgerStore;

/// Largest page `recent_orders` will return
pub const MAX_ORDER_PAGE: i64 = 500;

/// One position valued at the instrument's current price
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: Decimal,
    pub price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub account_id: AccountId,
    pub username: String,
    pub balance: Decimal,
    pub positions: Vec<PositionView>,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
    /// Cash plus market value of all positions
    pub equity: Decimal,
}

pub struct PortfolioService {
    store: Arc<dyn LedgerStore>,
}

impl PortfolioService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn portfolio(&self, account_id: AccountId) -> Result<PortfolioSummary> {
        let account = self
            .store
            .load_account(account_id)
            .await
            .map_err(|e| LedgerError::persistence("load_account", e))?
            .ok_or(TradeRejection::AccountNotFound {
                account_id: account_id.get(),
            })?;
        let holdings = self
            .store
            .list_holdings(account_id)
            .await
            .map_err(|e| LedgerError::persistence("list_holdings", e))?;

        let mut positions = Vec::with_capacity(holdings.len());
        for holding in holdings {
            let Some(instrument) = self
                .store
                .load_instrument(holding.instrument_id)
                .await
                .map_err(|e| LedgerError::persistence("load_instrument", e))?
            else {
                warn!("Holding references missing {}", holding.instrument_id);
                continue;
            };
            positions.push(PositionView {
                instrument_id: instrument.id,
                symbol: instrument.symbol,
                quantity: holding.quantity,
                avg_cost: holding.avg_cost,
                price: instrument.price,
                market_value: holding.market_value(instrument.price),
                cost_basis: holding.cost_basis(),
                unrealized_pnl: holding.unrealized_pnl(instrument.price),
            });
        }
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let market_value: Decimal = positions.iter().map(|p| p.market_value).sum();
        let cost_basis: Decimal = positions.iter().map(|p| p.cost_basis).sum();

        Ok(PortfolioSummary {
            account_id,
            username: account.username,
            balance: account.balance,
            market_value,
            cost_basis,
            unrealized_pnl: market_value - cost_basis,
            equity: account.balance + market_value,
            positions,
        })
    }

    /// Most recent orders of an account, newest first
    #[instrument(skip(self))]
    pub async fn recent_orders(&self, account_id: AccountId, limit: i64) -> Result<Vec<Order>> {
        let limit = limit.clamp(1, MAX_ORDER_PAGE);
        self.store
            .list_orders(account_id, limit)
            .await
            .map_err(|e| LedgerError::persistence("list_orders", e))
    }
}
