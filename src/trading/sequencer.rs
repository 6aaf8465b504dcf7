//! Order Sequencer
//!
//! Serializes mutations per account and per instrument. Each key maps to a
//! fair `tokio::sync::Mutex`, so waiters are served in arrival order. A lease
//! owns the guards for its keys and releases them on drop.
//!
//! Lock order: the account key is always taken before the instrument key.
//! Account keys and instrument keys live in separate namespaces and no
//! operation takes two keys of the same kind, so this single rule rules out
//! circular waits.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::domain::{AccountId, InstrumentId};
use crate::error::{LedgerError, Result};

/// A serialization key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeaseKey {
    Account(AccountId),
    Instrument(InstrumentId),
}

impl std::fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseKey::Account(id) => write!(f, "account:{}", id.get()),
            LeaseKey::Instrument(id) => write!(f, "instrument:{}", id.get()),
        }
    }
}

type Slot = Arc<Mutex<()>>;

#[derive(Debug, Default)]
struct SlotTable {
    slots: DashMap<LeaseKey, Slot>,
}

impl SlotTable {
    fn slot(&self, key: LeaseKey) -> Slot {
        self.slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the slot if nobody holds or waits on it
    fn reclaim(&self, key: &LeaseKey) {
        self.slots.remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Per-key admission gate for trades, cancellations and admin actions
#[derive(Debug, Clone)]
pub struct OrderSequencer {
    table: Arc<SlotTable>,
    timeout: Duration,
}

impl OrderSequencer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(SlotTable::default()),
            timeout,
        }
    }

    /// Exclusive access to an (account, instrument) pair
    pub async fn acquire(&self, account_id: AccountId, instrument_id: InstrumentId) -> Result<Lease> {
        self.acquire_keys(&[
            LeaseKey::Account(account_id),
            LeaseKey::Instrument(instrument_id),
        ])
        .await
    }

    /// Exclusive access to one account
    pub async fn acquire_account(&self, account_id: AccountId) -> Result<Lease> {
        self.acquire_keys(&[LeaseKey::Account(account_id)]).await
    }

    /// Exclusive access to one instrument
    pub async fn acquire_instrument(&self, instrument_id: InstrumentId) -> Result<Lease> {
        self.acquire_keys(&[LeaseKey::Instrument(instrument_id)]).await
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.table.slots.len()
    }

    async fn acquire_keys(&self, keys: &[LeaseKey]) -> Result<Lease> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut lease = Lease {
            table: self.table.clone(),
            held: Vec::with_capacity(keys.len()),
            acquired_at: Instant::now(),
        };

        for key in keys {
            let slot = self.table.slot(*key);
            match tokio::time::timeout_at(deadline, slot.lock_owned()).await {
                Ok(guard) => lease.held.push((*key, guard)),
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    warn!("Lease on {} not acquired after {}ms", key, waited_ms);
                    // `lease` drops here, releasing anything already taken
                    drop(lease);
                    self.table.reclaim(key);
                    return Err(LedgerError::Contention {
                        key: key.to_string(),
                        waited_ms,
                    });
                }
            }
        }

        lease.acquired_at = Instant::now();
        debug!(
            "Lease on {} granted after {}ms",
            lease.describe(),
            started.elapsed().as_millis()
        );
        Ok(lease)
    }
}

/// Proof of exclusive access to a set of keys; released on drop
pub struct Lease {
    table: Arc<SlotTable>,
    held: Vec<(LeaseKey, OwnedMutexGuard<()>)>,
    acquired_at: Instant,
}

impl Lease {
    pub fn keys(&self) -> Vec<LeaseKey> {
        self.held.iter().map(|(key, _)| *key).collect()
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    fn describe(&self) -> String {
        self.held
            .iter()
            .map(|(key, _)| key.to_string())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("keys", &self.keys())
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // Release in reverse acquisition order
        while let Some((key, guard)) = self.held.pop() {
            drop(guard);
            self.table.reclaim(&key);
        }
    }
}
