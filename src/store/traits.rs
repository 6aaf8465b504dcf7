use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Account, AccountId, Compensation, CompensationId, Holding, HoldingId, Instrument,
    InstrumentId, Order, OrderId, OrderStatus,
};
use crate::error::{LedgerError, Result};

/// What a trade does to a holding
#[derive(Debug, Clone, PartialEq)]
pub enum HoldingChange {
    /// Create or replace the (account, instrument) holding
    Upsert(Holding),
    /// Position closed out; remove the record
    Delete(HoldingId),
}

/// Account, instrument and holding as read for one trade
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSnapshot {
    pub account: Account,
    pub instrument: Instrument,
    pub holding: Option<Holding>,
}

impl TradeSnapshot {
    /// First row whose trade-relevant fields differ from `current`, as a key
    /// like `account:2`. `None` when a plan built on `self` is still valid.
    pub fn diverged_from(&self, current: &TradeSnapshot) -> Option<String> {
        if self.account.balance != current.account.balance
            || self.account.active != current.account.active
        {
            return Some(format!("account:{}", self.account.id.get()));
        }
        if self.instrument.price != current.instrument.price
            || self.instrument.suspended != current.instrument.suspended
        {
            return Some(format!("instrument:{}", self.instrument.id.get()));
        }
        let position = |h: &Option<Holding>| h.as_ref().map(|h| (h.quantity, h.avg_cost));
        if position(&self.holding) != position(&current.holding) {
            return Some(format!(
                "holding:{}:{}",
                self.account.id.get(),
                self.instrument.id.get()
            ));
        }
        None
    }
}

/// Every effect of one trade, computed under the lease and applied as a unit
#[derive(Debug, Clone)]
pub struct TradePlan {
    /// State the plan was computed from
    pub before: TradeSnapshot,
    /// Account after the debit/credit
    pub account: Account,
    pub holding: HoldingChange,
    /// Instrument after price impact
    pub instrument: Instrument,
    /// The COMPLETED order to record
    pub order: Order,
}

/// Every effect of one administrative cancellation
#[derive(Debug, Clone)]
pub struct CancellationPlan {
    pub order_id: OrderId,
    /// Account after the refund
    pub account: Account,
    pub compensation: Compensation,
}

/// Persistence capabilities the trading core consumes.
///
/// Single-row operations are atomic on their own. Stores that can also write
/// several rows in one transaction report `is_transactional()` and implement
/// `commit_trade` / `commit_cancellation`; otherwise the engine applies plans
/// step by step and undoes partial work itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    fn is_transactional(&self) -> bool {
        false
    }

    async fn load_account(&self, id: AccountId) -> Result<Option<Account>>;

    async fn save_account(&self, account: &Account) -> Result<()>;

    async fn load_instrument(&self, id: InstrumentId) -> Result<Option<Instrument>>;

    async fn save_instrument(&self, instrument: &Instrument) -> Result<()>;

    /// Ordered by symbol
    async fn list_instruments(&self) -> Result<Vec<Instrument>>;

    async fn find_instrument_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>>;

    async fn load_holding(
        &self,
        account_id: AccountId,
        instrument_id: InstrumentId,
    ) -> Result<Option<Holding>>;

    async fn list_holdings(&self, account_id: AccountId) -> Result<Vec<Holding>>;

    /// Insert or update the (account, instrument) holding, returning its id
    async fn upsert_holding(&self, holding: &Holding) -> Result<HoldingId>;

    async fn delete_holding(&self, id: HoldingId) -> Result<()>;

    async fn insert_order(&self, order: &Order) -> Result<OrderId>;

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Newest first
    async fn list_orders(&self, account_id: AccountId, limit: i64) -> Result<Vec<Order>>;

    /// Raw status and completion-time write; lifecycle rules are enforced by
    /// the caller
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn insert_compensation(&self, compensation: &Compensation) -> Result<CompensationId>;

    async fn mark_rollback_executed(&self, id: CompensationId) -> Result<()>;

    /// Compensation recorded for `order_id` whose refund was never applied
    async fn load_pending_compensation(&self, order_id: OrderId) -> Result<Option<Compensation>>;

    /// Apply a whole trade in one transaction.
    ///
    /// Fails with `LedgerError::Conflict` when the stored rows no longer match
    /// `plan.before`; nothing is written in that case.
    async fn commit_trade(&self, _plan: &TradePlan) -> Result<OrderId> {
        Err(LedgerError::Internal(
            "store does not support atomic trade commits".to_string(),
        ))
    }

    /// Apply a whole cancellation in one transaction
    async fn commit_cancellation(&self, _plan: &CancellationPlan) -> Result<CompensationId> {
        Err(LedgerError::Internal(
            "store does not support atomic cancellation commits".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use rust_decimal_macros::dec;

    fn snapshot() -> TradeSnapshot {
        TradeSnapshot {
            account: Account::new(AccountId(2), "alice", dec!(1000), Role::User),
            instrument: Instrument::new(InstrumentId(1), "ACME", "Acme Corp", dec!(100)),
            holding: None,
        }
    }

    #[test]
    fn test_unchanged_rows_do_not_diverge() {
        let mut current = snapshot();
        // Same value at database scale
        current.account.balance = dec!(1000.00000000);
        assert_eq!(snapshot().diverged_from(&current), None);
    }

    #[test]
    fn test_concurrent_debit_is_detected() {
        let mut current = snapshot();
        current.account.balance = dec!(0);
        assert_eq!(
            snapshot().diverged_from(&current).as_deref(),
            Some("account:2")
        );
    }

    #[test]
    fn test_new_holding_and_suspension_are_detected() {
        let mut current = snapshot();
        current.holding = Some(Holding {
            id: Some(HoldingId(5)),
            account_id: AccountId(2),
            instrument_id: InstrumentId(1),
            quantity: 10,
            avg_cost: dec!(100),
        });
        assert_eq!(
            snapshot().diverged_from(&current).as_deref(),
            Some("holding:2:1")
        );

        let mut current = snapshot();
        current.instrument.suspended = true;
        assert_eq!(
            snapshot().diverged_from(&current).as_deref(),
            Some("instrument:1")
        );
    }
}
