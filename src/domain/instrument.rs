use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::InstrumentId;
use crate::error::TradeRejection;

/// A tradable simulated stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub suspended: bool,
    pub suspension_reason: Option<String>,
}

impl Instrument {
    pub fn new(
        id: InstrumentId,
        symbol: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            name: name.into(),
            price,
            suspended: false,
            suspension_reason: None,
        }
    }

    /// Check the instrument accepts trades
    pub fn ensure_tradable(&self) -> Result<(), TradeRejection> {
        if self.suspended {
            return Err(TradeRejection::InstrumentSuspended {
                symbol: self.symbol.clone(),
                reason: self
                    .suspension_reason
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_string()),
            });
        }
        Ok(())
    }

    /// Notional value of `quantity` shares at the current price
    pub fn notional(&self, quantity: i64) -> Decimal {
        self.price * Decimal::from(quantity)
    }

    pub fn with_price(&self, price: Decimal) -> Self {
        Self {
            price,
            ..self.clone()
        }
    }
}
