//! In-process ledger store
//!
//! Keeps every table in memory behind a single async lock. It offers only
//! single-row atomicity (`is_transactional() == false`), so the trading engine
//! drives its step-by-step apply/undo path against it. Faults can be scripted
//! per operation to exercise that path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::{
    Account, AccountId, Compensation, CompensationId, Holding, HoldingId, Instrument,
    InstrumentId, Order, OrderId, OrderStatus,
};
use crate::error::{LedgerError, Result};
use crate::store::LedgerStore;

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    LoadAccount,
    SaveAccount,
    LoadInstrument,
    SaveInstrument,
    LoadHolding,
    UpsertHolding,
    DeleteHolding,
    InsertOrder,
    LoadOrder,
    UpdateOrderStatus,
    InsertCompensation,
    MarkRollbackExecuted,
    LoadCompensation,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LoadAccount => "load_account",
            Self::SaveAccount => "save_account",
            Self::LoadInstrument => "load_instrument",
            Self::SaveInstrument => "save_instrument",
            Self::LoadHolding => "load_holding",
            Self::UpsertHolding => "upsert_holding",
            Self::DeleteHolding => "delete_holding",
            Self::InsertOrder => "insert_order",
            Self::LoadOrder => "load_order",
            Self::UpdateOrderStatus => "update_order_status",
            Self::InsertCompensation => "insert_compensation",
            Self::MarkRollbackExecuted => "mark_rollback_executed",
            Self::LoadCompensation => "load_compensation",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    /// Successful calls to let through before failing
    skip: usize,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    instruments: HashMap<InstrumentId, Instrument>,
    holdings: HashMap<HoldingId, Holding>,
    orders: HashMap<OrderId, Order>,
    compensations: HashMap<CompensationId, Compensation>,
}

/// Memory-backed `LedgerStore`
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    faults: Mutex<Vec<Fault>>,
    next_id: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            faults: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Insert an account as-is (test and demo seeding)
    pub async fn seed_account(&self, account: Account) {
        self.tables.write().await.accounts.insert(account.id, account);
    }

    /// Insert an instrument as-is (test and demo seeding)
    pub async fn seed_instrument(&self, instrument: Instrument) {
        self.tables
            .write()
            .await
            .instruments
            .insert(instrument.id, instrument);
    }

    /// Fail the next call of `op`
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_after(op, 0);
    }

    /// Let `skip` calls of `op` succeed, then fail the one after
    pub fn fail_after(&self, op: StoreOp, skip: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(Fault { op, skip });
        }
    }

    /// All orders ever recorded, oldest first
    pub async fn all_orders(&self) -> Vec<Order> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.id);
        orders
    }

    /// All compensations ever recorded, oldest first
    pub async fn all_compensations(&self) -> Vec<Compensation> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Compensation> = tables.compensations.values().cloned().collect();
        rows.sort_by_key(|c| c.id);
        rows
    }

    /// Consult the fault script before touching the tables.
    ///
    /// Yields first so concurrent callers interleave the way they would
    /// against a real database.
    async fn io(&self, op: StoreOp) -> Result<()> {
        tokio::task::yield_now().await;

        let mut faults = self
            .faults
            .lock()
            .map_err(|_| LedgerError::Internal("fault table poisoned".to_string()))?;
        if let Some(pos) = faults.iter().position(|f| f.op == op) {
            let fault = &mut faults[pos];
            if fault.skip > 0 {
                fault.skip -= 1;
                return Ok(());
            }
            faults.remove(pos);
            warn!("Injected fault on {}", op);
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected fault: {}", op),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.io(StoreOp::LoadAccount).await?;
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn save_account(&self, account: &Account) -> Result<()> {
        self.io(StoreOp::SaveAccount).await?;
        let mut tables = self.tables.write().await;
        match tables.accounts.get_mut(&account.id) {
            Some(row) => {
                *row = account.clone();
                Ok(())
            }
            None => Err(LedgerError::Internal(format!("{} does not exist", account.id))),
        }
    }

    async fn load_instrument(&self, id: InstrumentId) -> Result<Option<Instrument>> {
        self.io(StoreOp::LoadInstrument).await?;
        Ok(self.tables.read().await.instruments.get(&id).cloned())
    }

    async fn save_instrument(&self, instrument: &Instrument) -> Result<()> {
        self.io(StoreOp::SaveInstrument).await?;
        let mut tables = self.tables.write().await;
        match tables.instruments.get_mut(&instrument.id) {
            Some(row) => {
                *row = instrument.clone();
                Ok(())
            }
            None => Err(LedgerError::Internal(format!(
                "{} does not exist",
                instrument.id
            ))),
        }
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>> {
        self.io(StoreOp::LoadInstrument).await?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Instrument> = tables.instruments.values().cloned().collect();
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(rows)
    }

    async fn find_instrument_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>> {
        self.io(StoreOp::LoadInstrument).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .instruments
            .values()
            .find(|i| i.symbol.eq_ignore_ascii_case(symbol))
            .cloned())
    }

    async fn load_holding(
        &self,
        account_id: AccountId,
        instrument_id: InstrumentId,
    ) -> Result<Option<Holding>> {
        self.io(StoreOp::LoadHolding).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .holdings
            .values()
            .find(|h| h.account_id == account_id && h.instrument_id == instrument_id)
            .cloned())
    }

    async fn list_holdings(&self, account_id: AccountId) -> Result<Vec<Holding>> {
        self.io(StoreOp::LoadHolding).await?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Holding> = tables
            .holdings
            .values()
            .filter(|h| h.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|h| h.instrument_id);
        Ok(rows)
    }

    async fn upsert_holding(&self, holding: &Holding) -> Result<HoldingId> {
        self.io(StoreOp::UpsertHolding).await?;
        if holding.quantity <= 0 {
            return Err(LedgerError::Internal(format!(
                "refusing to persist holding with quantity {}",
                holding.quantity
            )));
        }

        let mut tables = self.tables.write().await;
        let existing = tables
            .holdings
            .values()
            .find(|h| {
                h.account_id == holding.account_id && h.instrument_id == holding.instrument_id
            })
            .and_then(|h| h.id);
        let id = match existing.or(holding.id) {
            Some(id) => id,
            None => HoldingId(self.allocate_id()),
        };

        let mut row = holding.clone();
        row.id = Some(id);
        tables.holdings.insert(id, row);
        debug!("Upserted {} ({} shares)", id, holding.quantity);
        Ok(id)
    }

    async fn delete_holding(&self, id: HoldingId) -> Result<()> {
        self.io(StoreOp::DeleteHolding).await?;
        self.tables.write().await.holdings.remove(&id);
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<OrderId> {
        self.io(StoreOp::InsertOrder).await?;
        let id = OrderId(self.allocate_id());
        let mut row = order.clone();
        row.id = Some(id);
        self.tables.write().await.orders.insert(id, row);
        Ok(id)
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.io(StoreOp::LoadOrder).await?;
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, account_id: AccountId, limit: i64) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.io(StoreOp::UpdateOrderStatus).await?;
        let mut tables = self.tables.write().await;
        match tables.orders.get_mut(&id) {
            Some(order) => {
                order.status = status;
                order.completed_at = completed_at;
                Ok(())
            }
            None => Err(LedgerError::Internal(format!("{} does not exist", id))),
        }
    }

    async fn insert_compensation(&self, compensation: &Compensation) -> Result<CompensationId> {
        self.io(StoreOp::InsertCompensation).await?;
        let id = CompensationId(self.allocate_id());
        let mut row = compensation.clone();
        row.id = Some(id);
        self.tables.write().await.compensations.insert(id, row);
        Ok(id)
    }

    async fn mark_rollback_executed(&self, id: CompensationId) -> Result<()> {
        self.io(StoreOp::MarkRollbackExecuted).await?;
        let mut tables = self.tables.write().await;
        match tables.compensations.get_mut(&id) {
            Some(row) => {
                row.rollback_executed = true;
                Ok(())
            }
            None => Err(LedgerError::Internal(format!("{} does not exist", id))),
        }
    }

    async fn load_pending_compensation(&self, order_id: OrderId) -> Result<Option<Compensation>> {
        self.io(StoreOp::LoadCompensation).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .compensations
            .values()
            .filter(|c| c.order_id == order_id && !c.rollback_executed)
            .min_by_key(|c| c.id)
            .cloned())
    }
}
