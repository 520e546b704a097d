//! Incremental Updater.
//!
//! One new event is applied on top of the *stored* balance (not a replay) and
//! committed together with the bank increment. A commit that loses the
//! optimistic-concurrency race is retried with a fresh read, up to
//! [`RetryPolicy::max_attempts`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tally_ledger::{
    apply_to_balance, ids, validate_event, validate_submission, BankDelta, BankState, Cents,
    ChargeEvent, ChargeKind, LedgerEvent, PaymentEvent, UserBalance,
};
use tracing::{debug, info, warn};

use crate::error::{EngineError, StoreError};
use crate::store::{EventCommit, LedgerStore};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded conflict retry with linear backoff (`backoff * attempt`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// A charge as received from a submission surface, timestamp already normalized.
#[derive(Clone, Debug)]
pub struct NewCharge {
    pub uid: String,
    pub kind: ChargeKind,
    pub amount: Cents,
    pub timestamp: DateTime<Utc>,
    /// Client-supplied id; generated when absent.
    pub id: Option<String>,
    pub note: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewPayment {
    pub uid: String,
    pub amount: Cents,
    pub timestamp: DateTime<Utc>,
    /// Display name used for the id slug; falls back to `uid`.
    pub payer: Option<String>,
    pub note: Option<String>,
}

/// Result of a committed incremental update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub balance: UserBalance,
    /// Bank totals right after this commit.
    pub bank: BankState,
    pub bank_delta: BankDelta,
    pub event_id: String,
    /// `1` when the first commit went through.
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl Engine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn submit_charge(&self, charge: NewCharge) -> Result<Applied, EngineError> {
        validate_submission(&charge.uid, charge.amount)?;
        let id = match charge.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => ids::new_charge_id(charge.kind, &charge.uid, charge.timestamp),
        };
        let event = LedgerEvent::Charge(ChargeEvent {
            id,
            uid: charge.uid,
            kind: charge.kind,
            amount: charge.amount,
            timestamp: charge.timestamp,
            note: charge.note,
        });
        self.apply_new_event(event).await
    }

    pub async fn submit_payment(&self, payment: NewPayment) -> Result<Applied, EngineError> {
        validate_submission(&payment.uid, payment.amount)?;
        let slug_source = payment.payer.as_deref().unwrap_or(&payment.uid);
        let id = ids::new_payment_id(slug_source, payment.timestamp, payment.amount);
        let event = LedgerEvent::Payment(PaymentEvent {
            id,
            uid: payment.uid,
            amount: payment.amount,
            timestamp: payment.timestamp,
            payer: payment.payer,
            note: payment.note,
        });
        self.apply_new_event(event).await
    }

    /// Apply one fully-formed event on top of the stored balance and commit it.
    pub async fn apply_new_event(&self, event: LedgerEvent) -> Result<Applied, EngineError> {
        validate_event(&event)?;
        let uid = event.uid().to_string();
        let event_id = event.id().to_string();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let current = self.store.read_balance(&uid).await?;
            let (balance, bank_delta) = apply_to_balance(&current.balance, &event)?;
            let commit = EventCommit {
                event: event.clone(),
                expected_version: current.version,
                balance: balance.clone(),
                bank_delta,
                committed_at: Utc::now(),
            };

            match self.store.commit_event(commit).await {
                Ok(receipt) => {
                    info!(
                        uid = %uid,
                        event_id = %event_id,
                        category = event.category(),
                        amount = %event.amount(),
                        total_debt = %balance.total_debt,
                        attempt,
                        "event applied"
                    );
                    return Ok(Applied {
                        balance,
                        bank: receipt.bank,
                        bank_delta,
                        event_id,
                        attempts: attempt,
                    });
                }
                Err(StoreError::Conflict { .. }) if attempt < self.policy.max_attempts => {
                    debug!(uid = %uid, event_id = %event_id, attempt, "commit conflict; retrying");
                    tokio::time::sleep(self.policy.delay_after(attempt)).await;
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(uid = %uid, event_id = %event_id, attempts = attempt, "commit conflict; retries exhausted");
                    return Err(EngineError::Conflict {
                        uid,
                        attempts: attempt,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Stored balance, zero when the user has none.
    pub async fn balance(&self, uid: &str) -> Result<UserBalance, EngineError> {
        Ok(self.store.read_balance(uid).await?.balance)
    }

    pub async fn bank(&self) -> Result<BankState, EngineError> {
        Ok(self.store.read_bank().await?)
    }
}
