//! Administrative cancellation of completed orders.
//!
//! A cancellation refunds `price x quantity` to the order's account, marks the
//! order CANCELLED and leaves a compensation record. Holdings and the
//! instrument price are left as they are.
//!
//! Without store transactions the writes happen in this order:
//! compensation (flag false) -> order status -> refund -> flag true.
//! A compensation row whose flag is still false therefore records a reversal
//! that was never applied. Retrying the cancellation picks that row up again
//! instead of recording a second one.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{Account, AccountId, Compensation, Order, OrderId, OrderStatus};
use crate::error::{LedgerError, Result, TradeRejection};
use crate::store::{CancellationPlan, LedgerStore};
use crate::trading::admin::require_admin;
use crate::trading::sequencer::OrderSequencer;

pub struct CompensationHandler {
    store: Arc<dyn LedgerStore>,
    sequencer: OrderSequencer,
}

impl CompensationHandler {
    pub fn new(store: Arc<dyn LedgerStore>, sequencer: OrderSequencer) -> Self {
        Self { store, sequencer }
    }

    /// Cancel a COMPLETED order and refund its notional.
    ///
    /// Cancelling the same order twice fails the second time with
    /// `OrderNotCompleted`, so the refund is applied at most once.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: OrderId,
        admin_id: AccountId,
        reason: &str,
    ) -> Result<Compensation> {
        require_admin(self.store.as_ref(), admin_id).await?;

        let order = self.load_cancellable(order_id).await?;
        let _lease = self.sequencer.acquire_account(order.account_id).await?;

        // Another cancellation may have won the race for the lease
        let order = self.load_cancellable(order_id).await?;
        let account = self
            .store
            .load_account(order.account_id)
            .await
            .map_err(|e| LedgerError::persistence("load_account", e))?
            .ok_or(TradeRejection::AccountNotFound {
                account_id: order.account_id.get(),
            })?;

        let amount = order.notional();
        let plan = CancellationPlan {
            order_id,
            account: account.credited(amount),
            compensation: Compensation::new(order_id, account.id, admin_id, amount, reason),
        };

        let compensation = if self.store.is_transactional() {
            let id = self
                .store
                .commit_cancellation(&plan)
                .await
                .map_err(|e| LedgerError::from_store("commit_cancellation", e))?;
            Compensation {
                id: Some(id),
                rollback_executed: true,
                ..plan.compensation
            }
        } else {
            self.apply_in_steps(plan, &order, &account).await?
        };

        info!(
            "{} cancelled by {}: refunded {} to {} ({})",
            order_id, admin_id, amount, order.account_id, reason
        );
        Ok(compensation)
    }

    async fn load_cancellable(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .load_order(order_id)
            .await
            .map_err(|e| LedgerError::persistence("load_order", e))?
            .ok_or(TradeRejection::OrderNotFound {
                order_id: order_id.get(),
            })?;
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(TradeRejection::OrderNotCompleted {
                order_id: order_id.get(),
                status: order.status.to_string(),
            }
            .into());
        }
        Ok(order)
    }

    async fn apply_in_steps(
        &self,
        plan: CancellationPlan,
        order: &Order,
        prior: &Account,
    ) -> Result<Compensation> {
        let pending = self
            .store
            .load_pending_compensation(plan.order_id)
            .await
            .map_err(|e| LedgerError::persistence("load_compensation", e))?;
        let resumable = pending.and_then(|row| row.id.map(|id| (id, row)));
        let (compensation_id, recorded) = match resumable {
            Some((id, row)) => {
                debug!("Resuming unexecuted {} for {}", id, plan.order_id);
                (id, row)
            }
            None => {
                let id = self
                    .store
                    .insert_compensation(&plan.compensation)
                    .await
                    .map_err(|e| LedgerError::persistence("insert_compensation", e))?;
                (id, plan.compensation)
            }
        };

        if let Err(e) = self
            .store
            .update_order_status(plan.order_id, OrderStatus::Cancelled, Some(Utc::now()))
            .await
        {
            // Compensation row stays with rollback_executed = false
            return Err(LedgerError::persistence("order_status", e));
        }

        if let Err(e) = self.store.save_account(&plan.account).await {
            return Err(self.unwind(plan.order_id, order, None, "refund", e).await);
        }

        if let Err(e) = self.store.mark_rollback_executed(compensation_id).await {
            return Err(self
                .unwind(plan.order_id, order, Some(prior), "rollback_flag", e)
                .await);
        }

        Ok(Compensation {
            id: Some(compensation_id),
            rollback_executed: true,
            ..recorded
        })
    }

    /// Restore the refunded balance (if any) and the order as it was
    async fn unwind(
        &self,
        order_id: OrderId,
        original: &Order,
        refunded_from: Option<&Account>,
        stage: &str,
        cause: LedgerError,
    ) -> LedgerError {
        warn!("Cancellation of {} failed at '{}', undoing: {}", order_id, stage, cause);

        let mut undo_failures = Vec::new();
        if let Some(account) = refunded_from {
            if let Err(e) = self.store.save_account(account).await {
                error!("Undo of refund failed: {}", e);
                undo_failures.push(format!("refund: {}", e));
            }
        }
        if let Err(e) = self
            .store
            .update_order_status(order_id, original.status, original.completed_at)
            .await
        {
            error!("Undo of order status failed: {}", e);
            undo_failures.push(format!("order_status: {}", e));
        }

        if undo_failures.is_empty() {
            return LedgerError::persistence(stage, cause);
        }

        LedgerError::Inconsistency {
            order_id: Some(order_id.get()),
            reason: format!(
                "cancellation {} write failed ({}); undo failed for {}",
                stage,
                cause,
                undo_failures.join(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstrumentId, OrderSide, Role};
    use crate::store::MockLedgerStore;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn handler(store: MockLedgerStore) -> CompensationHandler {
        CompensationHandler::new(Arc::new(store), OrderSequencer::new(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_non_admin_is_refused_before_any_read() {
        let mut store = MockLedgerStore::new();
        store
            .expect_load_account()
            .returning(|id| Ok(Some(Account::new(id, "bob", dec!(10), Role::User))));

        let err = handler(store)
            .cancel(OrderId(1), AccountId(2), "mistake")
            .await
            .unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&TradeRejection::NotAuthorized { account_id: 2 })
        );
    }

    #[tokio::test]
    async fn test_transactional_cancel_sends_refund_plan() {
        let mut store = MockLedgerStore::new();
        store.expect_load_account().returning(|id| {
            let role = if id == AccountId(9) { Role::Admin } else { Role::User };
            Ok(Some(Account::new(id, "user", dec!(999.50), role)))
        });
        store.expect_load_order().returning(|id| {
            let mut order =
                Order::completed(AccountId(1), InstrumentId(1), OrderSide::Buy, 5, dec!(100.05));
            order.id = Some(id);
            Ok(Some(order))
        });
        store.expect_is_transactional().return_const(true);
        store
            .expect_commit_cancellation()
            .times(1)
            .withf(|plan: &CancellationPlan| {
                plan.account.balance == dec!(1499.75)
                    && plan.compensation.amount == dec!(500.25)
                    && !plan.compensation.rollback_executed
            })
            .returning(|_| Ok(crate::domain::CompensationId(4)));

        let compensation = handler(store)
            .cancel(OrderId(3), AccountId(9), "duplicate fill")
            .await
            .unwrap();
        assert!(compensation.rollback_executed);
        assert_eq!(compensation.order_id, OrderId(3));
        assert_eq!(compensation.admin_id, AccountId(9));
    }

    #[tokio::test]
    async fn test_order_cancelled_elsewhere_is_reported_as_rejection() {
        let mut store = MockLedgerStore::new();
        store.expect_load_account().returning(|id| {
            let role = if id == AccountId(9) { Role::Admin } else { Role::User };
            Ok(Some(Account::new(id, "user", dec!(10), role)))
        });
        store.expect_load_order().returning(|id| {
            let mut order =
                Order::completed(AccountId(1), InstrumentId(1), OrderSide::Sell, 2, dec!(50));
            order.id = Some(id);
            Ok(Some(order))
        });
        store.expect_is_transactional().return_const(true);
        // The conditional status update lost to another process
        store.expect_commit_cancellation().returning(|plan| {
            Err(TradeRejection::OrderNotCompleted {
                order_id: plan.order_id.get(),
                status: "CANCELLED".to_string(),
            }
            .into())
        });

        let err = handler(store)
            .cancel(OrderId(3), AccountId(9), "duplicate fill")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert_eq!(
            err.rejection(),
            Some(&TradeRejection::OrderNotCompleted {
                order_id: 3,
                status: "CANCELLED".to_string(),
            })
        );
    }
}
