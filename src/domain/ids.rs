use serde::{Deserialize, Serialize};

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

ledger_id!(
    /// Trading account identifier
    AccountId,
    "account"
);
ledger_id!(
    /// Listed instrument identifier
    InstrumentId,
    "instrument"
);
ledger_id!(HoldingId, "holding");
ledger_id!(OrderId, "order");
ledger_id!(CompensationId, "compensation");
