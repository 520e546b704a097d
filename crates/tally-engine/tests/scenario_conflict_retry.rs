use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use tally_engine::{
    CommitReceipt, Engine, EngineError, EventCommit, LedgerStore, MemoryStore, NewCharge,
    RetryPolicy, StoreError, VersionedBalance,
};
use tally_ledger::{BankState, Cents, ChargeKind, LedgerEvent, UserBalance};

/// Wraps a MemoryStore and reports a conflict for the first `fail_first` commits.
struct Contended {
    inner: MemoryStore,
    fail_first: u32,
    commits: AtomicU32,
}

impl Contended {
    fn new(fail_first: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_first,
            commits: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LedgerStore for Contended {
    fn name(&self) -> &'static str {
        "contended"
    }

    async fn read_balance(&self, uid: &str) -> Result<VersionedBalance, StoreError> {
        self.inner.read_balance(uid).await
    }

    async fn read_bank(&self) -> Result<BankState, StoreError> {
        self.inner.read_bank().await
    }

    async fn commit_event(&self, commit: EventCommit) -> Result<CommitReceipt, StoreError> {
        let n = self.commits.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(StoreError::Conflict {
                uid: commit.event.uid().to_string(),
            });
        }
        self.inner.commit_event(commit).await
    }

    async fn load_events(&self, uid: &str) -> Result<Vec<LedgerEvent>, StoreError> {
        self.inner.load_events(uid).await
    }

    async fn load_all_events(&self) -> Result<Vec<LedgerEvent>, StoreError> {
        self.inner.load_all_events().await
    }

    async fn overwrite_balance(&self, balance: &UserBalance) -> Result<i64, StoreError> {
        self.inner.overwrite_balance(balance).await
    }

    async fn list_uids(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_uids().await
    }
}

fn print_charge(uid: &str, cents: i64) -> NewCharge {
    NewCharge {
        uid: uid.to_string(),
        kind: ChargeKind::Print,
        amount: Cents::new(cents),
        timestamp: DateTime::from_timestamp(10, 0).unwrap(),
        id: None,
        note: None,
    }
}

#[tokio::test]
async fn scenario_transient_conflicts_are_retried_transparently() {
    let store = Arc::new(Contended::new(2));
    let engine = Engine::with_policy(store.clone(), RetryPolicy::new(5, 1));

    let applied = engine.submit_charge(print_charge("u1", 300)).await.unwrap();
    assert_eq!(applied.attempts, 3);
    assert_eq!(applied.balance.print_debt, Cents::new(300));
    assert_eq!(store.inner.event_count().await, 1);
}

#[tokio::test]
async fn scenario_exhausted_retries_surface_a_retryable_conflict() {
    let store = Arc::new(Contended::new(u32::MAX));
    let engine = Engine::with_policy(store.clone(), RetryPolicy::new(3, 1));

    let err = engine.submit_charge(print_charge("u1", 300)).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { attempts: 3, .. }));
    assert!(err.is_retryable());
    assert_eq!(store.inner.event_count().await, 0);
    assert_eq!(engine.balance("u1").await.unwrap(), UserBalance::zero("u1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_concurrent_same_user_submissions_serialize() {
    const N: i64 = 20;
    let store = Arc::new(MemoryStore::new());
    // Every lost race is caused by another task's successful commit, so N attempts always suffice.
    let engine = Engine::with_policy(store.clone(), RetryPolicy::new(N as u32, 1));

    let mut handles = Vec::new();
    for i in 0..N {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.submit_charge(print_charge("u1", 100 + i)).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let expected: i64 = (0..N).map(|i| 100 + i).sum();
    let balance = engine.balance("u1").await.unwrap();
    assert_eq!(balance.print_debt, Cents::new(expected));
    assert_eq!(store.event_count().await, N as usize);
}
