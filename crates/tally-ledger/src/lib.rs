//! tally-ledger
//!
//! Debt/credit ledger core for print and lamination charges.
//! - Append-only charge and payment events are the source of truth
//! - Waterfall allocation of payments (lamination first, then print, then credit)
//! - Full replay from zero in canonical order
//! - Integer cents throughout; decimals only at the I/O boundary
//! - Pure deterministic logic (no IO, no clock, no storage wiring)

mod ordering;
mod replay;
mod types;

pub mod allocator;
pub mod ids;
pub mod money;
pub mod time;
pub mod validation;

pub use allocator::{apply, apply_charge, apply_payment, apply_to_balance};
pub use money::{Cents, MoneyError, CENTS_SCALE};
pub use ordering::{canonical_cmp, sort_events_canonical};
pub use replay::{apply_sequentially, rebuild_balance, replay, ReplayOutcome};
pub use time::{parse_timestamp, TimestampError, TimestampInput};
pub use types::{
    AllocState, BankDelta, BankState, ChargeEvent, ChargeKind, LedgerEvent, PaymentEvent,
    UserBalance,
};
pub use validation::{validate_event, validate_submission, ValidationError};
