//! Weighted-average cost accounting for holdings

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{AccountId, Holding, InstrumentId};
use crate::error::TradeRejection;
use crate::store::HoldingChange;

/// Decimal places kept on average cost
pub const AVG_COST_SCALE: u32 = 8;

/// Holding after buying `quantity` shares at `price`.
///
/// `new_avg = (q * avg + quantity * price) / (q + quantity)`
pub fn apply_buy(
    existing: Option<&Holding>,
    account_id: AccountId,
    instrument_id: InstrumentId,
    quantity: i64,
    price: Decimal,
) -> Result<Holding, TradeRejection> {
    if quantity <= 0 {
        return Err(TradeRejection::InvalidQuantity { quantity });
    }

    let (id, prior_qty, prior_avg) = match existing {
        Some(h) => (h.id, h.quantity, h.avg_cost),
        None => (None, 0, Decimal::ZERO),
    };

    let new_qty = prior_qty + quantity;
    let total_cost = Decimal::from(prior_qty) * prior_avg + Decimal::from(quantity) * price;
    let avg_cost = (total_cost / Decimal::from(new_qty))
        .round_dp_with_strategy(AVG_COST_SCALE, RoundingStrategy::MidpointAwayFromZero);

    Ok(Holding {
        id,
        account_id,
        instrument_id,
        quantity: new_qty,
        avg_cost,
    })
}

/// Holding after selling `quantity` shares.
///
/// Average cost is untouched. Selling the whole position yields `Delete`.
pub fn apply_sell(existing: Option<&Holding>, quantity: i64) -> Result<HoldingChange, TradeRejection> {
    if quantity <= 0 {
        return Err(TradeRejection::InvalidQuantity { quantity });
    }

    let holding = match existing {
        Some(h) if h.quantity >= quantity => h,
        other => {
            return Err(TradeRejection::InsufficientShares {
                requested: quantity,
                held: other.map(|h| h.quantity).unwrap_or(0),
            })
        }
    };

    let remaining = holding.quantity - quantity;
    if remaining == 0 {
        return match holding.id {
            Some(id) => Ok(HoldingChange::Delete(id)),
            // Unpersisted holdings cannot be sold from
            None => Err(TradeRejection::InsufficientShares {
                requested: quantity,
                held: 0,
            }),
        };
    }

    Ok(HoldingChange::Upsert(Holding {
        quantity: remaining,
        ..holding.clone()
    }))
}
