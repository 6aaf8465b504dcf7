use crate::adapters::transaction_manager::TransactionManager;
use crate::domain::{
    Account, AccountId, Compensation, CompensationId, Holding, HoldingId, Instrument,
    InstrumentId, Order, OrderId, OrderSide, OrderStatus, Role,
};
use crate::error::{LedgerError, Result};
use crate::store::{CancellationPlan, LedgerStore, TradePlan, TradeSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgExecutor, Row};
use tracing::{debug, info, instrument};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    transactions: TransactionManager,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            transactions: TransactionManager::new(pool.clone()),
            pool,
        }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ==================== Seeding ====================

    /// Create an account (used by setup tooling)
    #[instrument(skip(self))]
    pub async fn create_account(&self, username: &str, balance: Decimal, role: Role) -> Result<AccountId> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (username, balance, role, active)
            VALUES ($1, $2, $3, TRUE)
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(balance)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(AccountId(row.get("id")))
    }

    /// Create an instrument (used by setup tooling)
    #[instrument(skip(self))]
    pub async fn create_instrument(&self, symbol: &str, name: &str, price: Decimal) -> Result<InstrumentId> {
        let row = sqlx::query(
            r#"
            INSERT INTO instruments (symbol, name, price, suspended)
            VALUES ($1, $2, $3, FALSE)
            RETURNING id
            "#,
        )
        .bind(symbol.to_uppercase())
        .bind(name)
        .bind(price)
        .fetch_one(&self.pool)
        .await?;

        Ok(InstrumentId(row.get("id")))
    }
}

// ==================== Row mapping ====================

fn account_from_row(r: &PgRow) -> Result<Account> {
    Ok(Account {
        id: AccountId(r.get("id")),
        username: r.get("username"),
        balance: r.get("balance"),
        role: Role::try_from(r.get::<String, _>("role").as_str()).map_err(LedgerError::Internal)?,
        active: r.get("active"),
    })
}

fn instrument_from_row(r: &PgRow) -> Instrument {
    Instrument {
        id: InstrumentId(r.get("id")),
        symbol: r.get("symbol"),
        name: r.get("name"),
        price: r.get("price"),
        suspended: r.get("suspended"),
        suspension_reason: r.get("suspension_reason"),
    }
}

fn holding_from_row(r: &PgRow) -> Holding {
    Holding {
        id: Some(HoldingId(r.get("id"))),
        account_id: AccountId(r.get("account_id")),
        instrument_id: InstrumentId(r.get("instrument_id")),
        quantity: r.get("quantity"),
        avg_cost: r.get("avg_cost"),
    }
}

fn order_from_row(r: &PgRow) -> Result<Order> {
    Ok(Order {
        id: Some(OrderId(r.get("id"))),
        client_order_id: r.get("client_order_id"),
        account_id: AccountId(r.get("account_id")),
        instrument_id: InstrumentId(r.get("instrument_id")),
        side: OrderSide::try_from(r.get::<String, _>("side").as_str())
            .map_err(LedgerError::Internal)?,
        quantity: r.get("quantity"),
        price: r.get("price"),
        status: OrderStatus::try_from(r.get::<String, _>("status").as_str())
            .map_err(LedgerError::Internal)?,
        error: r.get("error"),
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    })
}

fn compensation_from_row(r: &PgRow) -> Compensation {
    Compensation {
        id: Some(CompensationId(r.get("id"))),
        order_id: OrderId(r.get("order_id")),
        account_id: AccountId(r.get("account_id")),
        admin_id: AccountId(r.get("admin_id")),
        amount: r.get("amount"),
        reason: r.get("reason"),
        rollback_executed: r.get("rollback_executed"),
        created_at: r.get("created_at"),
    }
}

const ACCOUNT_COLUMNS: &str = "id, username, balance, role, active";

const INSTRUMENT_COLUMNS: &str = "id, symbol, name, price, suspended, suspension_reason";

const HOLDING_COLUMNS: &str = "id, account_id, instrument_id, quantity, avg_cost";

const ORDER_COLUMNS: &str = "id, client_order_id, account_id, instrument_id, side, quantity, \
                             price, status, error, created_at, completed_at";

// ==================== Row locks ====================

/// Lock the account, instrument and holding of a trade (in that order) for
/// the rest of the transaction and return them as they stand.
///
/// The account row lock also covers the holding, since holdings are only
/// written under it; a holding inserted concurrently is seen once it is held.
pub(crate) async fn lock_trade_rows(
    conn: &mut PgConnection,
    account_id: AccountId,
    instrument_id: InstrumentId,
) -> Result<TradeSnapshot> {
    let account = sqlx::query(&format!(
        "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
        ACCOUNT_COLUMNS
    ))
    .bind(account_id.get())
    .fetch_optional(&mut *conn)
    .await?
    .as_ref()
    .map(account_from_row)
    .transpose()?
    .ok_or_else(|| LedgerError::Conflict {
        key: format!("account:{}", account_id.get()),
    })?;

    let instrument = sqlx::query(&format!(
        "SELECT {} FROM instruments WHERE id = $1 FOR UPDATE",
        INSTRUMENT_COLUMNS
    ))
    .bind(instrument_id.get())
    .fetch_optional(&mut *conn)
    .await?
    .as_ref()
    .map(instrument_from_row)
    .ok_or_else(|| LedgerError::Conflict {
        key: format!("instrument:{}", instrument_id.get()),
    })?;

    let holding = sqlx::query(&format!(
        "SELECT {} FROM holdings WHERE account_id = $1 AND instrument_id = $2 FOR UPDATE",
        HOLDING_COLUMNS
    ))
    .bind(account_id.get())
    .bind(instrument_id.get())
    .fetch_optional(&mut *conn)
    .await?
    .as_ref()
    .map(holding_from_row);

    Ok(TradeSnapshot {
        account,
        instrument,
        holding,
    })
}

pub(crate) async fn order_status<'e, E: PgExecutor<'e>>(
    executor: E,
    id: OrderId,
) -> Result<Option<OrderStatus>> {
    let row = sqlx::query("SELECT status FROM orders WHERE id = $1")
        .bind(id.get())
        .fetch_optional(executor)
        .await?;

    row.map(|r| OrderStatus::try_from(r.get::<String, _>("status").as_str()))
        .transpose()
        .map_err(LedgerError::Internal)
}

// ==================== Writes ====================
//
// Shared by the pool-backed trait methods and the transaction manager, so a
// write means the same thing inside and outside a transaction.

pub(crate) async fn write_account<'e, E: PgExecutor<'e>>(executor: E, account: &Account) -> Result<()> {
    let done = sqlx::query(
        r#"
        UPDATE accounts SET
            balance = $2,
            active = $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account.id.get())
    .bind(account.balance)
    .bind(account.active)
    .execute(executor)
    .await?;

    if done.rows_affected() != 1 {
        return Err(LedgerError::Internal(format!("{} does not exist", account.id)));
    }
    Ok(())
}

/// Add `amount` to the stored balance, returning the new balance
pub(crate) async fn credit_account<'e, E: PgExecutor<'e>>(
    executor: E,
    id: AccountId,
    amount: Decimal,
) -> Result<Decimal> {
    let row = sqlx::query(
        r#"
        UPDATE accounts SET
            balance = balance + $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING balance
        "#,
    )
    .bind(id.get())
    .bind(amount)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| LedgerError::Internal(format!("{} does not exist", id)))?;

    Ok(row.get("balance"))
}

pub(crate) async fn write_instrument<'e, E: PgExecutor<'e>>(
    executor: E,
    instrument: &Instrument,
) -> Result<()> {
    let done = sqlx::query(
        r#"
        UPDATE instruments SET
            price = $2,
            suspended = $3,
            suspension_reason = $4,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(instrument.id.get())
    .bind(instrument.price)
    .bind(instrument.suspended)
    .bind(&instrument.suspension_reason)
    .execute(executor)
    .await?;

    if done.rows_affected() != 1 {
        return Err(LedgerError::Internal(format!("{} does not exist", instrument.id)));
    }
    Ok(())
}

pub(crate) async fn write_holding<'e, E: PgExecutor<'e>>(executor: E, holding: &Holding) -> Result<HoldingId> {
    let row = sqlx::query(
        r#"
        INSERT INTO holdings (account_id, instrument_id, quantity, avg_cost)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (account_id, instrument_id) DO UPDATE SET
            quantity = EXCLUDED.quantity,
            avg_cost = EXCLUDED.avg_cost,
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(holding.account_id.get())
    .bind(holding.instrument_id.get())
    .bind(holding.quantity)
    .bind(holding.avg_cost)
    .fetch_one(executor)
    .await?;

    Ok(HoldingId(row.get("id")))
}

pub(crate) async fn remove_holding<'e, E: PgExecutor<'e>>(executor: E, id: HoldingId) -> Result<()> {
    sqlx::query("DELETE FROM holdings WHERE id = $1")
        .bind(id.get())
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn write_order<'e, E: PgExecutor<'e>>(executor: E, order: &Order) -> Result<OrderId> {
    let row = sqlx::query(
        r#"
        INSERT INTO orders (
            client_order_id, account_id, instrument_id, side, quantity,
            price, status, error, created_at, completed_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(order.client_order_id)
    .bind(order.account_id.get())
    .bind(order.instrument_id.get())
    .bind(order.side.as_str())
    .bind(order.quantity)
    .bind(order.price)
    .bind(order.status.as_str())
    .bind(&order.error)
    .bind(order.created_at)
    .bind(order.completed_at)
    .fetch_one(executor)
    .await?;

    Ok(OrderId(row.get("id")))
}

/// Conditional status write; returns whether the order was in `from`
pub(crate) async fn transition_order<'e, E: PgExecutor<'e>>(
    executor: E,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<bool> {
    let done = sqlx::query(
        r#"
        UPDATE orders SET status = $3, completed_at = NOW()
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(id.get())
    .bind(from.as_str())
    .bind(to.as_str())
    .execute(executor)
    .await?;

    Ok(done.rows_affected() == 1)
}

pub(crate) async fn write_compensation<'e, E: PgExecutor<'e>>(
    executor: E,
    compensation: &Compensation,
) -> Result<CompensationId> {
    let row = sqlx::query(
        r#"
        INSERT INTO compensations (
            order_id, account_id, admin_id, amount, reason, rollback_executed, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(compensation.order_id.get())
    .bind(compensation.account_id.get())
    .bind(compensation.admin_id.get())
    .bind(compensation.amount)
    .bind(&compensation.reason)
    .bind(compensation.rollback_executed)
    .bind(compensation.created_at)
    .fetch_one(executor)
    .await?;

    Ok(CompensationId(row.get("id")))
}

#[async_trait]
impl LedgerStore for PostgresStore {
    fn is_transactional(&self) -> bool {
        true
    }

    #[instrument(skip(self))]
    async fn load_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS))
            .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn save_account(&self, account: &Account) -> Result<()> {
        write_account(&self.pool, account).await
    }

    #[instrument(skip(self))]
    async fn load_instrument(&self, id: InstrumentId) -> Result<Option<Instrument>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM instruments WHERE id = $1",
            INSTRUMENT_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(instrument_from_row))
    }

    async fn save_instrument(&self, instrument: &Instrument) -> Result<()> {
        write_instrument(&self.pool, instrument).await
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM instruments ORDER BY symbol",
            INSTRUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(instrument_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn find_instrument_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM instruments WHERE symbol = $1",
            INSTRUMENT_COLUMNS
        ))
        .bind(symbol.to_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(instrument_from_row))
    }

    #[instrument(skip(self))]
    async fn load_holding(
        &self,
        account_id: AccountId,
        instrument_id: InstrumentId,
    ) -> Result<Option<Holding>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, instrument_id, quantity, avg_cost
            FROM holdings WHERE account_id = $1 AND instrument_id = $2
            "#,
        )
        .bind(account_id.get())
        .bind(instrument_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(holding_from_row))
    }

    async fn list_holdings(&self, account_id: AccountId) -> Result<Vec<Holding>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, instrument_id, quantity, avg_cost
            FROM holdings WHERE account_id = $1
            ORDER BY instrument_id
            "#,
        )
        .bind(account_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(holding_from_row).collect())
    }

    async fn upsert_holding(&self, holding: &Holding) -> Result<HoldingId> {
        write_holding(&self.pool, holding).await
    }

    async fn delete_holding(&self, id: HoldingId) -> Result<()> {
        remove_holding(&self.pool, id).await
    }

    async fn insert_order(&self, order: &Order) -> Result<OrderId> {
        let id = write_order(&self.pool, order).await?;
        debug!("Inserted {} ({})", id, order.status);
        Ok(id)
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self, account_id: AccountId, limit: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE account_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
            ORDER_COLUMNS
        ))
        .bind(account_id.get())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2, completed_at = $3 WHERE id = $1")
            .bind(id.get())
            .bind(status.as_str())
            .bind(completed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_compensation(&self, compensation: &Compensation) -> Result<CompensationId> {
        write_compensation(&self.pool, compensation).await
    }

    async fn mark_rollback_executed(&self, id: CompensationId) -> Result<()> {
        sqlx::query("UPDATE compensations SET rollback_executed = TRUE WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_pending_compensation(&self, order_id: OrderId) -> Result<Option<Compensation>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, account_id, admin_id, amount, reason, rollback_executed, created_at
            FROM compensations
            WHERE order_id = $1 AND rollback_executed = FALSE
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(compensation_from_row))
    }

    async fn commit_trade(&self, plan: &TradePlan) -> Result<OrderId> {
        self.transactions.apply_trade(plan).await
    }

    async fn commit_cancellation(&self, plan: &CancellationPlan) -> Result<CompensationId> {
        self.transactions.apply_cancellation(plan).await
    }
}
