//! Price impact applied after every trade.
//!
//! A buy of `q` shares moves the price up by `price * rate * q`, a sell moves
//! it down by the same amount, never below the floor.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::config::PricingConfig;
use crate::domain::OrderSide;

/// Decimal places kept on instrument prices
pub const PRICE_SCALE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceImpactModel {
    impact_rate: Decimal,
    floor: Decimal,
}

impl Default for PriceImpactModel {
    fn default() -> Self {
        Self {
            impact_rate: dec!(0.0001),
            floor: dec!(0.01),
        }
    }
}

impl PriceImpactModel {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            impact_rate: config.impact_rate,
            floor: config.price_floor,
        }
    }

    pub fn floor(&self) -> Decimal {
        self.floor
    }

    /// Price after trading `quantity` shares on `side` at `current`
    pub fn next_price(&self, current: Decimal, quantity: i64, side: OrderSide) -> Decimal {
        let change = current * self.impact_rate * Decimal::from(quantity);
        let raw = match side {
            OrderSide::Buy => current + change,
            OrderSide::Sell => current - change,
        };
        raw.max(self.floor)
            .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// `next_price` with the default 1bp-per-share impact and 0.01 floor
pub fn next_price(current: Decimal, quantity: i64, side: OrderSide) -> Decimal {
    PriceImpactModel::default().next_price(current, quantity, side)
}
