//! Waterfall allocator: applies one event to a running balance state.
//!
//! Rules:
//! - Charge (print | lamination):
//!   - consumes standing credit first, up to the charge amount
//!   - whatever credit does not cover adds to the matching debt bucket
//!   - never moves money into the bank
//! - Payment:
//!   - pays lamination debt first (→ lamination bank)
//!   - then print debt (→ print bank)
//!   - any remainder becomes credit (→ print bank)
//!
//! Every bucket stays `>= 0`. Arithmetic is on integer cents, so each step is
//! exact to two decimals with no rounding in between. A bucket that would
//! leave the `i64` range fails the step with [`ValidationError::TotalOverflow`].
//!
//! Pure logic: no IO, no time, no randomness.

use chrono::{DateTime, Utc};

use crate::money::Cents;
use crate::types::{AllocState, BankDelta, ChargeKind, LedgerEvent, UserBalance};
use crate::validation::ValidationError;

/// Apply one event to `state`, returning the new state and the bank movement.
pub fn apply(
    state: AllocState,
    event: &LedgerEvent,
) -> Result<(AllocState, BankDelta), ValidationError> {
    match event {
        LedgerEvent::Charge(c) => Ok((apply_charge(state, c.kind, c.amount)?, BankDelta::ZERO)),
        LedgerEvent::Payment(p) => apply_payment(state, p.amount),
    }
}

/// Charge: credit first, remainder to the kind's debt bucket.
pub fn apply_charge(
    state: AllocState,
    kind: ChargeKind,
    amount: Cents,
) -> Result<AllocState, ValidationError> {
    debug_assert!(amount.is_positive(), "charge amount must be > 0");
    let amount = amount.clamp_non_negative();

    let mut next = state;
    let consumed = next.credit.min(amount);
    next.credit -= consumed;
    let remainder = amount - consumed;

    let bucket = match kind {
        ChargeKind::Print => &mut next.print_debt,
        ChargeKind::Lamination => &mut next.lamination_debt,
    };
    *bucket = bucket
        .checked_add(remainder)
        .ok_or(ValidationError::TotalOverflow)?;
    Ok(next)
}

/// Payment: lamination debt, then print debt, then credit.
pub fn apply_payment(
    state: AllocState,
    amount: Cents,
) -> Result<(AllocState, BankDelta), ValidationError> {
    debug_assert!(amount.is_positive(), "payment amount must be > 0");
    let mut remaining = amount.clamp_non_negative();
    let mut next = state;
    let mut delta = BankDelta::ZERO;

    let pay_lamination = remaining.min(next.lamination_debt);
    next.lamination_debt -= pay_lamination;
    remaining -= pay_lamination;
    delta.lamination_bank += pay_lamination;

    let pay_print = remaining.min(next.print_debt);
    next.print_debt -= pay_print;
    remaining -= pay_print;
    delta.print_bank += pay_print;

    if remaining.is_positive() {
        next.credit = next
            .credit
            .checked_add(remaining)
            .ok_or(ValidationError::TotalOverflow)?;
        delta.print_bank += remaining;
    }

    Ok((next, delta))
}

/// Apply one event to a stored balance document.
///
/// This is the single step shared by the incremental path and the full
/// replay: both produce a `UserBalance` through this function, which is what
/// makes them agree field-for-field. `last_payment` advances to the latest
/// payment timestamp seen.
pub fn apply_to_balance(
    balance: &UserBalance,
    event: &LedgerEvent,
) -> Result<(UserBalance, BankDelta), ValidationError> {
    let (state, delta) = apply(balance.state(), event)?;
    let last_payment = match event {
        LedgerEvent::Payment(p) => Some(latest(balance.last_payment, p.timestamp)),
        LedgerEvent::Charge(_) => balance.last_payment,
    };
    Ok((
        UserBalance::from_state(balance.uid.clone(), state, last_payment)?,
        delta,
    ))
}

fn latest(prev: Option<DateTime<Utc>>, ts: DateTime<Utc>) -> DateTime<Utc> {
    match prev {
        Some(p) if p > ts => p,
        _ => ts,
    }
}
