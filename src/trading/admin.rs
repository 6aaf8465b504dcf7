//! Market administration: suspend, resume and manual price overrides.
//!
//! Every action runs under the instrument lease so it serializes with trades
//! on the same instrument.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::{Account, AccountId, Instrument, InstrumentId};
use crate::error::{LedgerError, Result, TradeRejection};
use crate::store::LedgerStore;
use crate::trading::pricing::{PriceImpactModel, PRICE_SCALE};
use crate::trading::sequencer::OrderSequencer;

/// Outcome of a manual price override
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    /// Percent move, 4 decimal places of the ratio (0.0523 -> 5.23)
    pub change_pct: Decimal,
}

/// Load `admin_id` and check it may perform administrative actions
pub(crate) async fn require_admin(store: &dyn LedgerStore, admin_id: AccountId) -> Result<Account> {
    let account = store
        .load_account(admin_id)
        .await
        .map_err(|e| LedgerError::persistence("load_account", e))?
        .ok_or(TradeRejection::AccountNotFound {
            account_id: admin_id.get(),
        })?;
    account.ensure_admin()?;
    Ok(account)
}

fn change_pct(old: Decimal, new: Decimal) -> Decimal {
    if old.is_zero() {
        return Decimal::ZERO;
    }
    ((new - old) / old).round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
        * Decimal::ONE_HUNDRED
}

pub struct MarketAdmin {
    store: Arc<dyn LedgerStore>,
    sequencer: OrderSequencer,
    floor: Decimal,
}

impl MarketAdmin {
    pub fn new(store: Arc<dyn LedgerStore>, sequencer: OrderSequencer, pricing: &PriceImpactModel) -> Self {
        Self {
            store,
            sequencer,
            floor: pricing.floor(),
        }
    }

    /// Halt trading on an instrument
    #[instrument(skip(self))]
    pub async fn suspend(
        &self,
        instrument_id: InstrumentId,
        admin_id: AccountId,
        reason: &str,
    ) -> Result<Instrument> {
        require_admin(self.store.as_ref(), admin_id).await?;
        let _lease = self.sequencer.acquire_instrument(instrument_id).await?;

        let instrument = self.load(instrument_id).await?;
        // Already suspended reports the existing reason
        instrument.ensure_tradable()?;

        let updated = Instrument {
            suspended: true,
            suspension_reason: Some(reason.to_string()),
            ..instrument
        };
        self.save(&updated).await?;
        info!("{} suspended by {}: {}", updated.symbol, admin_id, reason);
        Ok(updated)
    }

    /// Reopen a suspended instrument
    #[instrument(skip(self))]
    pub async fn resume(&self, instrument_id: InstrumentId, admin_id: AccountId) -> Result<Instrument> {
        require_admin(self.store.as_ref(), admin_id).await?;
        let _lease = self.sequencer.acquire_instrument(instrument_id).await?;

        let instrument = self.load(instrument_id).await?;
        if !instrument.suspended {
            return Err(TradeRejection::InstrumentNotSuspended {
                symbol: instrument.symbol,
            }
            .into());
        }

        let updated = Instrument {
            suspended: false,
            suspension_reason: None,
            ..instrument
        };
        self.save(&updated).await?;
        info!("{} resumed by {}", updated.symbol, admin_id);
        Ok(updated)
    }

    /// Override the price. Allowed on suspended instruments.
    #[instrument(skip(self))]
    pub async fn set_price(
        &self,
        instrument_id: InstrumentId,
        admin_id: AccountId,
        new_price: Decimal,
        reason: &str,
    ) -> Result<PriceChange> {
        if new_price < self.floor {
            return Err(TradeRejection::InvalidPrice {
                price: new_price,
                floor: self.floor,
            }
            .into());
        }
        require_admin(self.store.as_ref(), admin_id).await?;
        let _lease = self.sequencer.acquire_instrument(instrument_id).await?;

        let instrument = self.load(instrument_id).await?;
        let new_price =
            new_price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
        let updated = instrument.with_price(new_price);
        self.save(&updated).await?;

        let change = PriceChange {
            instrument_id,
            symbol: instrument.symbol,
            old_price: instrument.price,
            new_price,
            change_pct: change_pct(instrument.price, new_price),
        };
        info!(
            "{} repriced {} -> {} ({}%) by {}: {}",
            change.symbol, change.old_price, change.new_price, change.change_pct, admin_id, reason
        );
        Ok(change)
    }

    async fn load(&self, instrument_id: InstrumentId) -> Result<Instrument> {
        Ok(self
            .store
            .load_instrument(instrument_id)
            .await
            .map_err(|e| LedgerError::persistence("load_instrument", e))?
            .ok_or(TradeRejection::InstrumentNotFound {
                instrument_id: instrument_id.get(),
            })?)
    }

    async fn save(&self, instrument: &Instrument) -> Result<()> {
        self.store
            .save_instrument(instrument)
            .await
            .map_err(|e| LedgerError::persistence("save_instrument", e))
    }
}
