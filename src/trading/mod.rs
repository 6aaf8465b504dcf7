//! Trading core: sequencing, execution, cancellation, market administration
//! and read-only market and portfolio views, all over a `LedgerStore`.

pub mod accounting;
pub mod admin;
pub mod compensation;
pub mod engine;
pub mod market;
pub mod portfolio;
pub mod pricing;
pub mod sequencer;

pub use admin::{MarketAdmin, PriceChange};
pub use compensation::CompensationHandler;
pub use engine::TradeEngine;
pub use market::MarketView;
pub use portfolio::{PortfolioService, PortfolioSummary, PositionView};
pub use pricing::PriceImpactModel;
pub use sequencer::{Lease, LeaseKey, OrderSequencer};

use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::LedgerStore;

/// Every ledger service wired to one store and one shared sequencer
pub struct Ledger {
    pub engine: TradeEngine,
    pub compensation: CompensationHandler,
    pub admin: MarketAdmin,
    pub market: MarketView,
    pub portfolio: PortfolioService,
    sequencer: OrderSequencer,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &AppConfig) -> Self {
        let sequencer = OrderSequencer::new(config.sequencer.lease_timeout());
        let pricing = PriceImpactModel::new(&config.pricing);

        Self {
            engine: TradeEngine::new(store.clone(), sequencer.clone(), pricing),
            compensation: CompensationHandler::new(store.clone(), sequencer.clone()),
            admin: MarketAdmin::new(store.clone(), sequencer.clone(), &pricing),
            market: MarketView::new(store.clone()),
            portfolio: PortfolioService::new(store),
            sequencer,
        }
    }

    pub fn sequencer(&self) -> &OrderSequencer {
        &self.sequencer
    }
}
