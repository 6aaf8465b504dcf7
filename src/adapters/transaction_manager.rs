//! Transaction Manager for atomic ledger updates
//!
//! A trade touches accounts, holdings, instruments and orders; a cancellation
//! touches compensations, orders and accounts. Each is committed here in a
//! single database transaction, so a failure leaves no partial effects.
//!
//! The in-process lease does not reach other processes sharing the database.
//! Trades therefore lock their rows with `SELECT ... FOR UPDATE` and refuse a
//! plan computed from rows that have since changed; cancellations credit the
//! refund relative to the stored balance behind a conditional status update.

use crate::adapters::postgres::{
    credit_account, lock_trade_rows, order_status, remove_holding, transition_order,
    write_account, write_compensation, write_holding, write_instrument, write_order,
};
use crate::domain::{Compensation, CompensationId, OrderId, OrderStatus};
use crate::error::{LedgerError, Result, TradeRejection};
use crate::store::{CancellationPlan, HoldingChange, TradePlan};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::{debug, info, instrument, warn};

/// Transaction scope identifier for tracking and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionScope {
    /// Balance, holding, price and order of one trade
    TradeExecution,
    /// Compensation, order status and refund of one cancellation
    OrderCancellation,
}

impl std::fmt::Display for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TradeExecution => write!(f, "trade_execution"),
            Self::OrderCancellation => write!(f, "order_cancellation"),
        }
    }
}

/// Transaction Manager for atomic database operations
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a new transaction with scope tracking
    #[instrument(skip(self))]
    pub async fn begin(&self, scope: TransactionScope) -> Result<ManagedTransaction<'_>> {
        let tx = self.pool.begin().await?;
        debug!("Started transaction for scope: {}", scope);
        Ok(ManagedTransaction {
            tx: Some(tx),
            scope,
            committed: false,
        })
    }

    // ==================== Atomic Operations ====================

    /// Atomically apply every effect of a trade and record its order
    #[instrument(skip(self, plan), fields(order = %plan.order.client_order_id))]
    pub async fn apply_trade(&self, plan: &TradePlan) -> Result<OrderId> {
        let mut tx = self.begin(TransactionScope::TradeExecution).await?;

        let current =
            lock_trade_rows(tx.executor()?, plan.account.id, plan.instrument.id).await?;
        if let Some(key) = plan.before.diverged_from(&current) {
            tx.rollback().await?;
            debug!("{} changed since the trade was planned", key);
            return Err(LedgerError::Conflict { key });
        }

        write_account(tx.executor()?, &plan.account).await?;
        match &plan.holding {
            HoldingChange::Upsert(holding) => {
                write_holding(tx.executor()?, holding).await?;
            }
            HoldingChange::Delete(id) => remove_holding(tx.executor()?, *id).await?,
        }
        write_instrument(tx.executor()?, &plan.instrument).await?;
        let order_id = write_order(tx.executor()?, &plan.order).await?;

        tx.commit().await?;
        info!(
            "Atomically applied {} {} x {} for {}",
            plan.order.side, plan.order.quantity, plan.instrument.symbol, plan.account.id
        );
        Ok(order_id)
    }

    /// Atomically refund a cancelled order and record the compensation
    #[instrument(skip(self, plan), fields(order = %plan.order_id))]
    pub async fn apply_cancellation(&self, plan: &CancellationPlan) -> Result<CompensationId> {
        let mut tx = self.begin(TransactionScope::OrderCancellation).await?;

        // Committed together, so the refund is executed the moment the row exists
        let compensation = Compensation {
            rollback_executed: true,
            ..plan.compensation.clone()
        };
        let compensation_id = write_compensation(tx.executor()?, &compensation).await?;

        let transitioned = transition_order(
            tx.executor()?,
            plan.order_id,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        )
        .await?;
        if !transitioned {
            let status = order_status(tx.executor()?, plan.order_id).await?;
            tx.rollback().await?;
            let order_id = plan.order_id.get();
            return Err(match status {
                Some(status) => TradeRejection::OrderNotCompleted {
                    order_id,
                    status: status.to_string(),
                },
                None => TradeRejection::OrderNotFound { order_id },
            }
            .into());
        }

        let refund = plan.compensation.amount;
        let balance = credit_account(tx.executor()?, plan.account.id, refund).await?;
        debug!("Credited {} to {}, balance now {}", refund, plan.account.id, balance);

        tx.commit().await?;
        info!(
            "Atomically cancelled {} with compensation {}",
            plan.order_id, compensation_id
        );
        Ok(compensation_id)
    }
}

/// A managed transaction with automatic rollback on drop
pub struct ManagedTransaction<'a> {
    tx: Option<Transaction<'a, Postgres>>,
    scope: TransactionScope,
    committed: bool,
}

impl<'a> ManagedTransaction<'a> {
    /// Underlying connection for executing queries.
    /// Use as: `.execute(tx.executor()?).await`
    pub fn executor(&mut self) -> Result<&mut sqlx::PgConnection> {
        let scope = self.scope;
        let tx = self.tx.as_mut().ok_or_else(|| {
            LedgerError::Internal(format!("transaction for {} already consumed", scope))
        })?;
        Ok(&mut **tx)
    }

    /// Commit the transaction
    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            self.committed = true;
            debug!("Committed transaction for scope: {}", self.scope);
        }
        Ok(())
    }

    /// Rollback the transaction explicitly
    pub async fn rollback(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            warn!("Rolled back transaction for scope: {}", self.scope);
        }
        Ok(())
    }
}

impl<'a> Drop for ManagedTransaction<'a> {
    fn drop(&mut self) {
        if self.tx.is_some() && !self.committed {
            // Transaction will be rolled back automatically by sqlx
            warn!(
                "Transaction for scope {} was dropped without commit - rolling back",
                self.scope
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_scope_display() {
        assert_eq!(TransactionScope::TradeExecution.to_string(), "trade_execution");
        assert_eq!(
            TransactionScope::OrderCancellation.to_string(),
            "order_cancellation"
        );
    }
}
