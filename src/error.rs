use thiserror::Error;

/// Main error type for the ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Validation errors (never retried)
    #[error("Rejected: {0}")]
    Rejected(#[from] TradeRejection),

    // Lease could not be acquired in time
    #[error("Busy: lease on {key} not acquired after {waited_ms}ms")]
    Contention { key: String, waited_ms: u64 },

    // Rows changed under a transactional commit; nothing was written
    #[error("Conflict: {key} changed by another writer")]
    Conflict { key: String },

    // Store failure whose partial effects were undone
    #[error("Persistence failed during {stage}: {reason}")]
    Persistence { stage: String, reason: String },

    // Undo failed; state needs manual reconciliation
    #[error("Ledger inconsistency (order {order_id:?}): {reason}")]
    Inconsistency {
        order_id: Option<i64>,
        reason: String,
    },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for LedgerError
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Coarse classification used by callers to decide on retries and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Contention,
    Persistence,
    Inconsistency,
    Internal,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Rejected(_) => ErrorKind::Validation,
            LedgerError::Contention { .. } | LedgerError::Conflict { .. } => {
                ErrorKind::Contention
            }
            LedgerError::Persistence { .. }
            | LedgerError::Database(_)
            | LedgerError::Io(_) => ErrorKind::Persistence,
            LedgerError::Inconsistency { .. } => ErrorKind::Inconsistency,
            LedgerError::Config(_)
            | LedgerError::Migration(_)
            | LedgerError::Json(_)
            | LedgerError::Internal(_)
            | LedgerError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Lease contention and write conflicts leave no effects and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Contention
    }

    /// The rejection reason, if this is a validation failure
    pub fn rejection(&self) -> Option<&TradeRejection> {
        match self {
            LedgerError::Rejected(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn persistence(stage: &str, err: impl std::fmt::Display) -> Self {
        LedgerError::Persistence {
            stage: stage.to_string(),
            reason: err.to_string(),
        }
    }

    /// Wrap a store error as `Persistence`, keeping rejections and conflicts
    /// a transactional store reports after re-checking rows under lock.
    pub(crate) fn from_store(stage: &str, err: LedgerError) -> Self {
        match err.kind() {
            ErrorKind::Validation | ErrorKind::Contention => err,
            _ => LedgerError::persistence(stage, err),
        }
    }
}

/// Specific reasons a trade, cancellation or admin action is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeRejection {
    #[error("Quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: i64 },

    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: i64 },

    #[error("Account {account_id} is inactive")]
    AccountInactive { account_id: i64 },

    #[error("Account {account_id} is not an administrator")]
    NotAuthorized { account_id: i64 },

    #[error("Instrument not found: {instrument_id}")]
    InstrumentNotFound { instrument_id: i64 },

    #[error("Unknown symbol: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("Instrument {symbol} is suspended: {reason}")]
    InstrumentSuspended { symbol: String, reason: String },

    #[error("Instrument {symbol} is not suspended")]
    InstrumentNotSuspended { symbol: String },

    #[error("Invalid price {price}: must be at least {floor}")]
    InvalidPrice {
        price: rust_decimal::Decimal,
        floor: rust_decimal::Decimal,
    },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: i64, held: i64 },

    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: i64 },

    #[error("Order {order_id} is {status}, only COMPLETED orders can be cancelled")]
    OrderNotCompleted { order_id: i64, status: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejection_is_validation_kind() {
        let err: LedgerError = TradeRejection::InsufficientShares {
            requested: 15,
            held: 10,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Insufficient shares"));
    }

    #[test]
    fn test_contention_is_retryable() {
        let err = LedgerError::Contention {
            key: "account:1".to_string(),
            waited_ms: 250,
        };
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Contention);
    }

    #[test]
    fn test_store_errors_keep_rejections_and_conflicts() {
        let rejected = LedgerError::from_store(
            "commit_cancellation",
            TradeRejection::OrderNotCompleted {
                order_id: 3,
                status: "CANCELLED".to_string(),
            }
            .into(),
        );
        assert_eq!(rejected.kind(), ErrorKind::Validation);
        assert!(rejected.rejection().is_some());

        let conflict = LedgerError::from_store(
            "commit_trade",
            LedgerError::Conflict {
                key: "account:2".to_string(),
            },
        );
        assert!(conflict.is_retryable());

        let io = LedgerError::from_store(
            "commit_trade",
            LedgerError::Io(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
        );
        assert_eq!(io.kind(), ErrorKind::Persistence);
        assert!(io.to_string().contains("commit_trade"));
    }

    #[test]
    fn test_rejection_accessor() {
        let err: LedgerError = TradeRejection::InsufficientFunds {
            required: dec!(500.25),
            available: dec!(500),
        }
        .into();
        assert!(matches!(
            err.rejection(),
            Some(TradeRejection::InsufficientFunds { .. })
        ));
        assert!(LedgerError::Internal("x".into()).rejection().is_none());
    }
}
