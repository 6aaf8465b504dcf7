use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, HoldingId, InstrumentId};

/// An account's position in one instrument.
///
/// `id` is `None` until the store has assigned one. A holding with quantity
/// zero is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: Option<HoldingId>,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub quantity: i64,
    pub avg_cost: Decimal,
}

impl Holding {
    /// Cost basis (quantity x average cost)
    pub fn cost_basis(&self) -> Decimal {
        self.avg_cost * Decimal::from(self.quantity)
    }

    /// Market value at `price`
    pub fn market_value(&self, price: Decimal) -> Decimal {
        price * Decimal::from(self.quantity)
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.market_value(price) - self.cost_basis()
    }
}
