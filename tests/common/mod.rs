#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use stockledger::adapters::MemoryStore;
use stockledger::config::AppConfig;
use stockledger::domain::{Account, AccountId, Instrument, InstrumentId, Role};
use stockledger::trading::Ledger;

pub const ADMIN: AccountId = AccountId(1);
pub const ALICE: AccountId = AccountId(2);
pub const BOB: AccountId = AccountId(3);
pub const ACME: InstrumentId = InstrumentId(1);
pub const GLOBEX: InstrumentId = InstrumentId(2);

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<Ledger>,
}

impl Harness {
    pub async fn account(&self, id: AccountId) -> Account {
        use stockledger::store::LedgerStore;
        self.store.load_account(id).await.unwrap().unwrap()
    }

    pub async fn balance(&self, id: AccountId) -> Decimal {
        self.account(id).await.balance
    }

    pub async fn price(&self, id: InstrumentId) -> Decimal {
        use stockledger::store::LedgerStore;
        self.store.load_instrument(id).await.unwrap().unwrap().price
    }

    pub async fn holding(
        &self,
        account_id: AccountId,
        instrument_id: InstrumentId,
    ) -> Option<stockledger::domain::Holding> {
        use stockledger::store::LedgerStore;
        self.store
            .load_holding(account_id, instrument_id)
            .await
            .unwrap()
    }
}

/// Admin with no cash, alice with `alice_cash`, bob with 2000.00,
/// ACME and GLBX both at 100.00
pub async fn harness_with(alice_cash: Decimal, config: AppConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store
        .seed_account(Account::new(ADMIN, "admin", dec!(0), Role::Admin))
        .await;
    store
        .seed_account(Account::new(ALICE, "alice", alice_cash, Role::User))
        .await;
    store
        .seed_account(Account::new(BOB, "bob", dec!(2000.00), Role::User))
        .await;
    store
        .seed_instrument(Instrument::new(ACME, "ACME", "Acme Corp", dec!(100.00)))
        .await;
    store
        .seed_instrument(Instrument::new(GLOBEX, "GLBX", "Globex", dec!(100.00)))
        .await;

    let ledger = Arc::new(Ledger::new(store.clone(), &config));
    Harness { store, ledger }
}

pub async fn harness() -> Harness {
    harness_with(dec!(1000.00), AppConfig::default_config()).await
}
