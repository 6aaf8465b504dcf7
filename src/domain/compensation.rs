use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, CompensationId, OrderId};

/// Record of an administrative reversal of a completed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    pub id: Option<CompensationId>,
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub admin_id: AccountId,
    /// Cash returned to the account
    pub amount: Decimal,
    pub reason: String,
    /// Set once the refund has actually been applied
    pub rollback_executed: bool,
    pub created_at: DateTime<Utc>,
}

impl Compensation {
    pub fn new(
        order_id: OrderId,
        account_id: AccountId,
        admin_id: AccountId,
        amount: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            order_id,
            account_id,
            admin_id,
            amount,
            reason: reason.into(),
            rollback_executed: false,
            created_at: Utc::now(),
        }
    }
}
