pub mod traits;

pub use traits::{CancellationPlan, HoldingChange, LedgerStore, TradePlan, TradeSnapshot};

#[cfg(test)]
pub use traits::MockLedgerStore;
