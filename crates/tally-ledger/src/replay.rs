//! Full replay of a user's history from the zero state.
//!
//! Determinism invariant: folding events one by one through
//! [`apply_to_balance`] from a stored balance (the incremental path) must land
//! on the same `UserBalance` as [`rebuild_balance`] over the same events in
//! canonical order. Both paths share the same step function, so the only way
//! they diverge is ordering, which [`sort_events_canonical`] pins down.

use crate::allocator::apply_to_balance;
use crate::ordering::sort_events_canonical;
use crate::types::{BankDelta, LedgerEvent, UserBalance};
use crate::validation::ValidationError;

/// Result of a replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub balance: UserBalance,
    /// Number of events belonging to `uid` that were folded.
    pub events_replayed: usize,
}

/// Rebuild `uid`'s balance from the events in `events` that belong to it.
///
/// Events for other users are ignored. Input order does not matter. A history
/// whose totals leave the `i64` range is rejected rather than wrapped.
pub fn replay(uid: &str, events: &[LedgerEvent]) -> Result<ReplayOutcome, ValidationError> {
    let mut own: Vec<LedgerEvent> = events.iter().filter(|e| e.uid() == uid).cloned().collect();
    sort_events_canonical(&mut own);

    let mut balance = UserBalance::zero(uid);
    for ev in &own {
        balance = apply_to_balance(&balance, ev)?.0;
    }

    Ok(ReplayOutcome {
        balance,
        events_replayed: own.len(),
    })
}

/// Shorthand for `replay(uid, events)?.balance`.
pub fn rebuild_balance(uid: &str, events: &[LedgerEvent]) -> Result<UserBalance, ValidationError> {
    Ok(replay(uid, events)?.balance)
}

/// Apply `events` one at a time, in the order given, starting from `start`.
///
/// This is what a sequence of incremental submissions computes; tests compare
/// it against [`rebuild_balance`]. Returns the final balance and the summed
/// bank movement.
pub fn apply_sequentially(
    start: &UserBalance,
    events: &[LedgerEvent],
) -> Result<(UserBalance, BankDelta), ValidationError> {
    let mut balance = start.clone();
    let mut bank = BankDelta::ZERO;
    for ev in events {
        let (next, delta) = apply_to_balance(&balance, ev)?;
        balance = next;
        bank = bank.checked_add(delta).ok_or(ValidationError::TotalOverflow)?;
    }
    Ok((balance, bank))
}
