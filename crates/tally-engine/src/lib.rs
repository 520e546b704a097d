//! tally-engine
//!
//! Store-driven execution paths over the pure ledger core.
//! - `LedgerStore`: the persistence seam (versioned balance documents, atomic event commits)
//! - Incremental Updater with bounded optimistic-concurrency retry
//! - Full Reconciler (replay + overwrite, never touches bank totals)
//! - Trailing reconcile scheduler for post-payment passes
//! - In-memory store for tests and single-process use

mod engine;
mod error;
mod memory;
mod reconcile;
mod scheduler;
mod store;

pub use engine::{Applied, Engine, NewCharge, NewPayment, RetryPolicy};
pub use error::{EngineError, StoreError};
pub use memory::MemoryStore;
pub use reconcile::{compare_balances, BalanceDrift, ReconcileReport};
pub use scheduler::ReconcileScheduler;
pub use store::{CommitReceipt, EventCommit, LedgerStore, VersionedBalance};
