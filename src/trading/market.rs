//! Read-only instrument listing and symbol lookup.

use std::sync::Arc;
use tracing::instrument;

use crate::domain::Instrument;
use crate::error::{LedgerError, Result, TradeRejection};
use crate::store::LedgerStore;

pub struct MarketView {
    store: Arc<dyn LedgerStore>,
}

impl MarketView {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Every instrument, suspended ones included, ordered by symbol
    pub async fn instruments(&self) -> Result<Vec<Instrument>> {
        self.store
            .list_instruments()
            .await
            .map_err(|e| LedgerError::persistence("list_instruments", e))
    }

    /// Case-insensitive lookup
    #[instrument(skip(self))]
    pub async fn instrument(&self, symbol: &str) -> Result<Instrument> {
        let symbol = symbol.trim();
        self.store
            .find_instrument_by_symbol(symbol)
            .await
            .map_err(|e| LedgerError::persistence("find_instrument_by_symbol", e))?
            .ok_or_else(|| {
                TradeRejection::SymbolNotFound {
                    symbol: symbol.to_uppercase(),
                }
                .into()
            })
    }
}
