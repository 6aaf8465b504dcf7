use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AccountId;
use crate::error::TradeRejection;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Trading account with a cash balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub balance: Decimal,
    pub role: Role,
    pub active: bool,
}

impl Account {
    pub fn new(id: AccountId, username: impl Into<String>, balance: Decimal, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            balance,
            role,
            active: true,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Account copy with `amount` removed from the balance.
    ///
    /// Refuses to go below zero; the balance is never observable negative.
    pub fn debited(&self, amount: Decimal) -> Result<Self, TradeRejection> {
        if amount > self.balance {
            return Err(TradeRejection::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }
        Ok(Self {
            balance: self.balance - amount,
            ..self.clone()
        })
    }

    /// Account copy with `amount` added to the balance
    pub fn credited(&self, amount: Decimal) -> Self {
        Self {
            balance: self.balance + amount,
            ..self.clone()
        }
    }

    /// Check the account may act at all
    pub fn ensure_active(&self) -> Result<(), TradeRejection> {
        if self.active {
            Ok(())
        } else {
            Err(TradeRejection::AccountInactive {
                account_id: self.id.get(),
            })
        }
    }

    /// Check the account may perform administrative actions
    pub fn ensure_admin(&self) -> Result<(), TradeRejection> {
        self.ensure_active()?;
        if self.is_admin() {
            Ok(())
        } else {
            Err(TradeRejection::NotAuthorized {
                account_id: self.id.get(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_debit_to_exactly_zero() {
        let account = Account::new(AccountId(1), "alice", dec!(1000.00), Role::User);
        let after = account.debited(dec!(1000.00)).unwrap();
        assert_eq!(after.balance, dec!(0.00));
        // original untouched
        assert_eq!(account.balance, dec!(1000.00));
    }

    #[test]
    fn test_debit_refuses_overdraft() {
        let account = Account::new(AccountId(1), "alice", dec!(500.00), Role::User);
        let err = account.debited(dec!(500.25)).unwrap_err();
        assert_eq!(
            err,
            TradeRejection::InsufficientFunds {
                required: dec!(500.25),
                available: dec!(500.00)
            }
        );
    }

    #[test]
    fn test_admin_checks() {
        let mut admin = Account::new(AccountId(9), "root", Decimal::ZERO, Role::Admin);
        assert!(admin.ensure_admin().is_ok());

        admin.active = false;
        assert!(matches!(
            admin.ensure_admin(),
            Err(TradeRejection::AccountInactive { .. })
        ));

        let user = Account::new(AccountId(2), "bob", Decimal::ZERO, Role::User);
        assert!(matches!(
            user.ensure_admin(),
            Err(TradeRejection::NotAuthorized { account_id: 2 })
        ));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::try_from("admin").unwrap(), Role::Admin);
        assert!(Role::try_from("root").is_err());
    }
}
