//! In-process [`LedgerStore`].
//!
//! All documents sit behind one `tokio::sync::Mutex`, so every commit is a
//! single critical section: the version check, the event append, the balance
//! write and the bank increment happen together or not at all. Used by tests,
//! by the daemon when `/store/backend` is `memory`, and by the CLI dry paths.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use tally_ledger::{BankState, LedgerEvent, UserBalance};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{CommitReceipt, EventCommit, LedgerStore, VersionedBalance};

#[derive(Default)]
struct Inner {
    balances: BTreeMap<String, VersionedBalance>,
    bank: BankState,
    events: Vec<LedgerEvent>,
    event_ids: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with history but no projections, as after a bulk
    /// import. Duplicate ids keep the first occurrence.
    pub fn with_events(events: impl IntoIterator<Item = LedgerEvent>) -> Self {
        let mut inner = Inner::default();
        for ev in events {
            if inner.event_ids.insert(ev.id().to_string()) {
                inner.events.push(ev);
            }
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub async fn event_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read_balance(&self, uid: &str) -> Result<VersionedBalance, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .balances
            .get(uid)
            .cloned()
            .unwrap_or_else(|| VersionedBalance::absent(uid)))
    }

    async fn read_bank(&self) -> Result<BankState, StoreError> {
        Ok(self.inner.lock().await.bank.clone())
    }

    async fn commit_event(&self, commit: EventCommit) -> Result<CommitReceipt, StoreError> {
        let mut inner = self.inner.lock().await;
        let uid = commit.event.uid().to_string();

        let current = inner.balances.get(&uid).map(|b| b.version).unwrap_or(0);
        if current != commit.expected_version {
            return Err(StoreError::Conflict { uid });
        }
        if inner.event_ids.contains(commit.event.id()) {
            return Err(StoreError::DuplicateEvent {
                id: commit.event.id().to_string(),
            });
        }

        let mut bank = inner.bank.clone();
        bank.apply_delta(commit.bank_delta, commit.committed_at)
            .map_err(StoreError::Invalid)?;

        let version = current + 1;
        inner.bank = bank;
        inner.event_ids.insert(commit.event.id().to_string());
        inner.events.push(commit.event);
        inner.balances.insert(
            uid,
            VersionedBalance {
                balance: commit.balance,
                version,
            },
        );

        Ok(CommitReceipt {
            version,
            bank: inner.bank.clone(),
        })
    }

    async fn load_events(&self, uid: &str) -> Result<Vec<LedgerEvent>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.events.iter().filter(|e| e.uid() == uid).cloned().collect())
    }

    async fn load_all_events(&self) -> Result<Vec<LedgerEvent>, StoreError> {
        Ok(self.inner.lock().await.events.clone())
    }

    async fn overwrite_balance(&self, balance: &UserBalance) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let version = inner
            .balances
            .get(&balance.uid)
            .map(|b| b.version)
            .unwrap_or(0)
            + 1;
        inner.balances.insert(
            balance.uid.clone(),
            VersionedBalance {
                balance: balance.clone(),
                version,
            },
        );
        Ok(version)
    }

    async fn list_uids(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        let mut uids: BTreeSet<String> = inner.balances.keys().cloned().collect();
        uids.extend(inner.events.iter().map(|e| e.uid().to_string()));
        Ok(uids.into_iter().collect())
    }
}
