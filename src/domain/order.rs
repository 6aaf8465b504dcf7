use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, InstrumentId, OrderId};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderSide {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            _ => Err(format!("Invalid order side: {}", s)),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted but not yet applied
    Pending,
    /// All effects applied
    Completed,
    /// Effects could not be applied or undone; needs reconciliation
    Failed,
    /// Administratively reversed
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Allowed lifecycle moves: PENDING -> COMPLETED | FAILED, COMPLETED -> CANCELLED
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Completed, OrderStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "FAILED" => Ok(OrderStatus::Failed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

/// Order (one trade intent and its outcome)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<OrderId>,
    pub client_order_id: Uuid,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub quantity: i64,
    /// Execution price (instrument price before this trade's impact)
    pub price: Decimal,
    pub status: OrderStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A completed order executed at `price`
    pub fn completed(
        account_id: AccountId,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: i64,
        price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            client_order_id: Uuid::new_v4(),
            account_id,
            instrument_id,
            side,
            quantity,
            price,
            status: OrderStatus::Completed,
            error: None,
            created_at: now,
            completed_at: Some(now),
        }
    }

    /// Same intent, recorded as FAILED with a diagnostic reason
    pub fn into_failed(self, reason: impl Into<String>) -> Self {
        Self {
            id: None,
            status: OrderStatus::Failed,
            error: Some(reason.into()),
            completed_at: None,
            ..self
        }
    }

    /// Cash value of the order at its execution price
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
