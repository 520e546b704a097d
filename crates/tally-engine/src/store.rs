//! Persistence seam.
//!
//! The engine never talks to a database directly. It reads versioned balance
//! documents and hands back one [`EventCommit`] per new event; the store makes
//! that commit all-or-nothing.
//!
//! # Commit contract
//! - `expected_version` is the version returned by `read_balance` (`0` when the
//!   document did not exist). If the stored version differs the commit fails
//!   with [`StoreError::Conflict`] and nothing is written.
//! - An event id that already exists fails with [`StoreError::DuplicateEvent`].
//! - Otherwise the event row, the new balance (version + 1) and the additive
//!   bank increment become visible together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_ledger::{BankDelta, BankState, LedgerEvent, UserBalance};

use crate::error::StoreError;

/// A balance document plus its optimistic-concurrency version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedBalance {
    pub balance: UserBalance,
    /// `0` = no document stored yet.
    pub version: i64,
}

impl VersionedBalance {
    pub fn absent(uid: &str) -> Self {
        Self {
            balance: UserBalance::zero(uid),
            version: 0,
        }
    }

    pub fn exists(&self) -> bool {
        self.version > 0
    }
}

/// One incremental update, applied atomically.
#[derive(Clone, Debug)]
pub struct EventCommit {
    pub event: LedgerEvent,
    pub expected_version: i64,
    pub balance: UserBalance,
    pub bank_delta: BankDelta,
    pub committed_at: DateTime<Utc>,
}

/// What the store reports back after a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    pub version: i64,
    /// Bank totals after the increment.
    pub bank: BankState,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Human-readable backend name (e.g. `"memory"`, `"postgres"`).
    fn name(&self) -> &'static str;

    /// Current balance document; [`VersionedBalance::absent`] when missing.
    async fn read_balance(&self, uid: &str) -> Result<VersionedBalance, StoreError>;

    async fn read_bank(&self) -> Result<BankState, StoreError>;

    async fn commit_event(&self, commit: EventCommit) -> Result<CommitReceipt, StoreError>;

    /// Every recorded event for `uid`, in no particular order.
    async fn load_events(&self, uid: &str) -> Result<Vec<LedgerEvent>, StoreError>;

    /// Every recorded event, in no particular order.
    async fn load_all_events(&self) -> Result<Vec<LedgerEvent>, StoreError>;

    /// Unconditional overwrite (last writer wins). Bumps the version so
    /// in-flight incremental commits that read the old document retry.
    async fn overwrite_balance(&self, balance: &UserBalance) -> Result<i64, StoreError>;

    /// Every uid with a balance document or at least one event, ascending.
    async fn list_uids(&self) -> Result<Vec<String>, StoreError>;
}
