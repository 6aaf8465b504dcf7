pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod store;
pub mod trading;

pub use adapters::{MemoryStore, PostgresStore};
pub use config::AppConfig;
pub use error::{ErrorKind, LedgerError, Result, TradeRejection};
pub use store::LedgerStore;
pub use trading::Ledger;
