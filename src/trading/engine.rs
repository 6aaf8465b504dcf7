//! Trade Execution Engine
//!
//! Validates a trade, takes the (account, instrument) lease, re-reads and
//! re-validates under it, then applies balance, holding, price and order as
//! one unit.
//!
//! Stores that support transactions get the whole `TradePlan` in one commit.
//! Such a store re-reads the rows under its own locks and refuses the plan with
//! `Conflict` if another process changed them; the trade is then re-read and
//! re-planned, up to `MAX_PLAN_ATTEMPTS` times.
//!
//! Otherwise the plan is applied in the fixed order
//! balance -> holding -> price -> order, and a failure part-way through
//! undoes the earlier writes in reverse. If the undo fails too, the order is
//! recorded as FAILED with the diagnostic and `Inconsistency` is returned.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{AccountId, Holding, HoldingId, InstrumentId, Order, OrderSide};
use crate::error::{LedgerError, Result, TradeRejection};
use crate::store::{HoldingChange, LedgerStore, TradePlan, TradeSnapshot};
use crate::trading::accounting::{apply_buy, apply_sell};
use crate::trading::pricing::PriceImpactModel;
use crate::trading::sequencer::OrderSequencer;

/// Commits refused with `Conflict` before the conflict is returned
const MAX_PLAN_ATTEMPTS: u32 = 3;

/// A write already applied that must be reverted if a later one fails
#[derive(Debug)]
enum Applied {
    Balance,
    /// Holding was newly created with this id
    HoldingCreated(HoldingId),
    /// Holding existed before the trade (updated or deleted)
    HoldingReplaced(Holding),
    Price,
}

impl Applied {
    fn name(&self) -> &'static str {
        match self {
            Applied::Balance => "balance",
            Applied::HoldingCreated(_) | Applied::HoldingReplaced(_) => "holding",
            Applied::Price => "price",
        }
    }
}

pub struct TradeEngine {
    store: Arc<dyn LedgerStore>,
    sequencer: OrderSequencer,
    pricing: PriceImpactModel,
}

impl TradeEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        sequencer: OrderSequencer,
        pricing: PriceImpactModel,
    ) -> Self {
        Self {
            store,
            sequencer,
            pricing,
        }
    }

    /// Execute a market trade at the instrument's current price.
    ///
    /// Returns the COMPLETED order. Validation failures leave no trace;
    /// store failures are undone where possible.
    #[instrument(skip(self), fields(account = %account_id, instrument = %instrument_id))]
    pub async fn execute(
        &self,
        account_id: AccountId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: i64,
    ) -> Result<Order> {
        if quantity <= 0 {
            return Err(TradeRejection::InvalidQuantity { quantity }.into());
        }

        // Reject obvious failures without queueing on the lease
        let snapshot = self.read_state(account_id, instrument_id).await?;
        self.plan(&snapshot, side, quantity)?;

        let lease = self.sequencer.acquire(account_id, instrument_id).await?;

        let mut attempt = 1;
        let (symbol, result) = loop {
            let fresh = self.read_state(account_id, instrument_id).await?;
            let plan = self.plan(&fresh, side, quantity)?;
            debug!(
                "Planned {} {} @ {}: balance {} -> {}, price {} -> {}",
                side,
                quantity,
                plan.order.price,
                fresh.account.balance,
                plan.account.balance,
                fresh.instrument.price,
                plan.instrument.price
            );

            let result = if self.store.is_transactional() {
                self.commit_atomic(plan).await
            } else {
                self.apply_in_steps(plan).await
            };
            match result {
                Err(LedgerError::Conflict { key }) if attempt < MAX_PLAN_ATTEMPTS => {
                    debug!("{} changed before commit, re-planning (attempt {})", key, attempt);
                    attempt += 1;
                }
                other => break (fresh.instrument.symbol, other),
            }
        };
        drop(lease);

        if let Ok(order) = &result {
            info!(
                "Executed {} {} x {} @ {} ({:?})",
                order.side,
                order.quantity,
                symbol,
                order.price,
                order.id
            );
        }
        result
    }

    async fn read_state(
        &self,
        account_id: AccountId,
        instrument_id: InstrumentId,
    ) -> Result<TradeSnapshot> {
        let account = self
            .store
            .load_account(account_id)
            .await
            .map_err(|e| LedgerError::persistence("load_account", e))?
            .ok_or(TradeRejection::AccountNotFound {
                account_id: account_id.get(),
            })?;
        let instrument = self
            .store
            .load_instrument(instrument_id)
            .await
            .map_err(|e| LedgerError::persistence("load_instrument", e))?
            .ok_or(TradeRejection::InstrumentNotFound {
                instrument_id: instrument_id.get(),
            })?;
        let holding = self
            .store
            .load_holding(account_id, instrument_id)
            .await
            .map_err(|e| LedgerError::persistence("load_holding", e))?;

        Ok(TradeSnapshot {
            account,
            instrument,
            holding,
        })
    }

    /// Check preconditions and compute every effect of the trade
    fn plan(
        &self,
        state: &TradeSnapshot,
        side: OrderSide,
        quantity: i64,
    ) -> std::result::Result<TradePlan, TradeRejection> {
        state.account.ensure_active()?;
        state.instrument.ensure_tradable()?;

        let price = state.instrument.price;
        let notional = state.instrument.notional(quantity);

        let (account, holding) = match side {
            OrderSide::Buy => {
                let account = state.account.debited(notional)?;
                let holding = apply_buy(
                    state.holding.as_ref(),
                    state.account.id,
                    state.instrument.id,
                    quantity,
                    price,
                )?;
                (account, HoldingChange::Upsert(holding))
            }
            OrderSide::Sell => {
                let holding = apply_sell(state.holding.as_ref(), quantity)?;
                (state.account.credited(notional), holding)
            }
        };

        let instrument = state
            .instrument
            .with_price(self.pricing.next_price(price, quantity, side));
        let order = Order::completed(
            state.account.id,
            state.instrument.id,
            side,
            quantity,
            price,
        );

        Ok(TradePlan {
            before: state.clone(),
            account,
            holding,
            instrument,
            order,
        })
    }

    async fn commit_atomic(&self, plan: TradePlan) -> Result<Order> {
        let id = self
            .store
            .commit_trade(&plan)
            .await
            .map_err(|e| LedgerError::from_store("commit_trade", e))?;
        let mut order = plan.order;
        order.id = Some(id);
        Ok(order)
    }

    async fn apply_in_steps(&self, plan: TradePlan) -> Result<Order> {
        let prior = &plan.before;
        let mut applied: Vec<Applied> = Vec::with_capacity(3);

        if let Err(e) = self.store.save_account(&plan.account).await {
            // Nothing written yet
            return Err(LedgerError::persistence("save_account", e));
        }
        applied.push(Applied::Balance);

        let holding_write = match &plan.holding {
            HoldingChange::Upsert(holding) => {
                self.store.upsert_holding(holding).await.map(|id| match &prior.holding {
                    Some(old) => Applied::HoldingReplaced(old.clone()),
                    None => Applied::HoldingCreated(id),
                })
            }
            HoldingChange::Delete(id) => match &prior.holding {
                Some(old) => self
                    .store
                    .delete_holding(*id)
                    .await
                    .map(|_| Applied::HoldingReplaced(old.clone())),
                None => Err(LedgerError::Internal(format!(
                    "delete of {} planned without a prior holding",
                    id
                ))),
            },
        };
        match holding_write {
            Ok(step) => applied.push(step),
            Err(e) => return Err(self.unwind(applied, &plan, "holding", e).await),
        }

        if let Err(e) = self.store.save_instrument(&plan.instrument).await {
            return Err(self.unwind(applied, &plan, "price", e).await);
        }
        applied.push(Applied::Price);

        match self.store.insert_order(&plan.order).await {
            Ok(id) => {
                let mut order = plan.order;
                order.id = Some(id);
                Ok(order)
            }
            Err(e) => Err(self.unwind(applied, &plan, "order", e).await),
        }
    }

    /// Revert `applied` in reverse order and produce the error to surface
    async fn unwind(
        &self,
        applied: Vec<Applied>,
        plan: &TradePlan,
        stage: &str,
        cause: LedgerError,
    ) -> LedgerError {
        warn!(
            "Trade write '{}' failed after {} step(s), undoing: {}",
            stage,
            applied.len(),
            cause
        );

        let prior = &plan.before;
        let mut undo_failures = Vec::new();
        for step in applied.into_iter().rev() {
            let name = step.name();
            let result = match step {
                Applied::Price => self.store.save_instrument(&prior.instrument).await,
                Applied::HoldingCreated(id) => self.store.delete_holding(id).await,
                Applied::HoldingReplaced(old) => {
                    self.store.upsert_holding(&old).await.map(|_| ())
                }
                Applied::Balance => self.store.save_account(&prior.account).await,
            };
            if let Err(e) = result {
                error!("Undo of {} failed: {}", name, e);
                undo_failures.push(format!("{}: {}", name, e));
            }
        }

        if undo_failures.is_empty() {
            info!("Undid partial trade after '{}' failure", stage);
            return LedgerError::persistence(stage, cause);
        }

        let reason = format!(
            "{} write failed ({}); undo failed for {}",
            stage,
            cause,
            undo_failures.join(", ")
        );
        let failed = plan.order.clone().into_failed(reason.clone());
        let order_id = match self.store.insert_order(&failed).await {
            Ok(id) => {
                error!("Recorded FAILED {} for reconciliation: {}", id, reason);
                Some(id.get())
            }
            Err(e) => {
                error!(
                    "Could not record FAILED order {} ({}): {}",
                    failed.client_order_id, e, reason
                );
                None
            }
        };

        LedgerError::Inconsistency { order_id, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, Instrument, Role};
    use crate::error::ErrorKind;
    use crate::store::MockLedgerStore;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn engine(store: MockLedgerStore) -> TradeEngine {
        TradeEngine::new(
            Arc::new(store),
            OrderSequencer::new(Duration::from_secs(1)),
            PriceImpactModel::default(),
        )
    }

    fn seeded_mock() -> MockLedgerStore {
        let mut store = MockLedgerStore::new();
        store.expect_load_account().returning(|id| {
            Ok(Some(Account::new(id, "alice", dec!(1000.00), Role::User)))
        });
        store.expect_load_instrument().returning(|id| {
            Ok(Some(Instrument::new(id, "ACME", "Acme Corp", dec!(100.00))))
        });
        store.expect_load_holding().returning(|_, _| Ok(None));
        store
    }

    #[tokio::test]
    async fn test_load_failure_writes_nothing() {
        let mut store = MockLedgerStore::new();
        store.expect_load_account().returning(|_| {
            Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connection reset",
            )))
        });
        // No save/insert expectations: any write would panic the mock

        let err = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Buy, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.to_string().contains("load_account"));
    }

    #[tokio::test]
    async fn test_transactional_store_gets_whole_plan() {
        let mut store = seeded_mock();
        store.expect_is_transactional().return_const(true);
        store
            .expect_commit_trade()
            .times(1)
            .withf(|plan: &TradePlan| {
                plan.account.balance == dec!(0.00)
                    && plan.instrument.price == dec!(100.10)
                    && matches!(&plan.holding, HoldingChange::Upsert(h) if h.quantity == 10)
            })
            .returning(|_| Ok(crate::domain::OrderId(77)));

        let order = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Buy, 10)
            .await
            .unwrap();
        assert_eq!(order.id, Some(crate::domain::OrderId(77)));
        assert_eq!(order.price, dec!(100.00));
    }

    #[tokio::test]
    async fn test_transactional_failure_is_persistence_without_failed_order() {
        let mut store = seeded_mock();
        store.expect_is_transactional().return_const(true);
        store.expect_commit_trade().returning(|_| {
            Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "commit lost",
            )))
        });
        // insert_order deliberately not expected

        let err = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Buy, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn test_rejection_before_lease() {
        let store = seeded_mock();
        let err = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Buy, 11)
            .await
            .unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(TradeRejection::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_quantity_never_touches_store() {
        let store = MockLedgerStore::new();
        let err = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Sell, 0)
            .await
            .unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&TradeRejection::InvalidQuantity { quantity: 0 })
        );
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_replanned_from_fresh_rows() {
        let mut store = MockLedgerStore::new();
        let reads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        // Pre-lease read and first plan see 1000; another process then spends 600
        store.expect_load_account().returning(move |id| {
            let n = reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let balance = if n < 2 { dec!(1000.00) } else { dec!(400.00) };
            Ok(Some(Account::new(id, "alice", balance, Role::User)))
        });
        store.expect_load_instrument().returning(|id| {
            Ok(Some(Instrument::new(id, "ACME", "Acme Corp", dec!(100.00))))
        });
        store.expect_load_holding().returning(|_, _| Ok(None));
        store.expect_is_transactional().return_const(true);

        let commits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = commits.clone();
        store.expect_commit_trade().returning(move |plan: &TradePlan| {
            if seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(LedgerError::Conflict {
                    key: "account:1".to_string(),
                });
            }
            assert_eq!(plan.before.account.balance, dec!(400.00));
            assert_eq!(plan.account.balance, dec!(0.00));
            Ok(crate::domain::OrderId(8))
        });

        let order = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Buy, 4)
            .await
            .unwrap();
        assert_eq!(order.id, Some(crate::domain::OrderId(8)));
        assert_eq!(commits.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_conflict_that_drains_funds_becomes_rejection() {
        let mut store = MockLedgerStore::new();
        let reads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        // A second process bought with the same cash between our read and commit
        store.expect_load_account().returning(move |id| {
            let n = reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let balance = if n < 2 { dec!(1000.00) } else { dec!(0.00) };
            Ok(Some(Account::new(id, "alice", balance, Role::User)))
        });
        store.expect_load_instrument().returning(|id| {
            Ok(Some(Instrument::new(id, "ACME", "Acme Corp", dec!(100.00))))
        });
        store.expect_load_holding().returning(|_, _| Ok(None));
        store.expect_is_transactional().return_const(true);
        store.expect_commit_trade().times(1).returning(|_| {
            Err(LedgerError::Conflict {
                key: "account:1".to_string(),
            })
        });

        let err = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Buy, 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(TradeRejection::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_persistent_conflict_is_returned_as_retryable() {
        let mut store = seeded_mock();
        store.expect_is_transactional().return_const(true);
        store
            .expect_commit_trade()
            .times(MAX_PLAN_ATTEMPTS as usize)
            .returning(|_| {
                Err(LedgerError::Conflict {
                    key: "instrument:1".to_string(),
                })
            });

        let err = engine(store)
            .execute(AccountId(1), InstrumentId(1), OrderSide::Buy, 1)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Contention);
    }
}
