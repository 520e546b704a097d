//! Invariant-checking boundary for new events.
//!
//! Everything the allocator assumes about its input is checked here, before
//! any transaction starts. A rejected event never reaches a store.

use crate::money::Cents;
use crate::types::LedgerEvent;

/// All invariant violations a new event can surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `uid` is empty or whitespace.
    EmptyUid,
    /// `id` is empty or whitespace.
    EmptyId,
    /// `amount` must be strictly positive.
    NonPositiveAmount { amount: Cents },
    /// `amount` exceeds [`Cents::MAX_AMOUNT`].
    AmountTooLarge { amount: Cents, max: Cents },
    /// Applying the event would push a debt, credit or bank total past the
    /// representable range.
    TotalOverflow,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUid => write!(f, "event invariant: uid must not be empty"),
            Self::EmptyId => write!(f, "event invariant: id must not be empty"),
            Self::NonPositiveAmount { amount } => {
                write!(f, "event invariant: amount must be > 0, got {amount}")
            }
            Self::AmountTooLarge { amount, max } => {
                write!(f, "event invariant: amount must be <= {max}, got {amount}")
            }
            Self::TotalOverflow => write!(f, "event invariant: running total out of range"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a uid/amount pair; the shared part of every submission.
pub fn validate_submission(uid: &str, amount: Cents) -> Result<(), ValidationError> {
    if uid.trim().is_empty() {
        return Err(ValidationError::EmptyUid);
    }
    if !amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount { amount });
    }
    if amount > Cents::MAX_AMOUNT {
        return Err(ValidationError::AmountTooLarge {
            amount,
            max: Cents::MAX_AMOUNT,
        });
    }
    Ok(())
}

/// Check a fully built event (id assigned).
pub fn validate_event(event: &LedgerEvent) -> Result<(), ValidationError> {
    validate_submission(event.uid(), event.amount())?;
    if event.id().trim().is_empty() {
        return Err(ValidationError::EmptyId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChargeEvent, ChargeKind};
    use chrono::DateTime;

    fn charge(id: &str, uid: &str, cents: i64) -> LedgerEvent {
        LedgerEvent::Charge(ChargeEvent {
            id: id.to_string(),
            uid: uid.to_string(),
            kind: ChargeKind::Print,
            amount: Cents::new(cents),
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            note: None,
        })
    }

    #[test]
    fn rejects_empty_uid() {
        assert_eq!(validate_event(&charge("x", "  ", 100)), Err(ValidationError::EmptyUid));
    }

    #[test]
    fn rejects_zero_and_negative_amounts() {
        assert_eq!(
            validate_event(&charge("x", "u", 0)),
            Err(ValidationError::NonPositiveAmount { amount: Cents::ZERO })
        );
        assert_eq!(
            validate_event(&charge("x", "u", -5)),
            Err(ValidationError::NonPositiveAmount {
                amount: Cents::new(-5)
            })
        );
    }

    #[test]
    fn rejects_amounts_above_ceiling() {
        let max = Cents::MAX_AMOUNT.raw();
        assert!(validate_event(&charge("x", "u", max)).is_ok());
        assert_eq!(
            validate_event(&charge("x", "u", max + 1)),
            Err(ValidationError::AmountTooLarge {
                amount: Cents::new(max + 1),
                max: Cents::MAX_AMOUNT
            })
        );
    }

    #[test]
    fn rejects_empty_id() {
        assert_eq!(validate_event(&charge("", "u", 100)), Err(ValidationError::EmptyId));
    }

    #[test]
    fn accepts_well_formed_event() {
        assert!(validate_event(&charge("x", "u", 1)).is_ok());
    }
}
