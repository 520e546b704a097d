use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Cents;
use crate::validation::ValidationError;

/// Billable resource category of a charge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeKind {
    Print,
    Lamination,
}

impl ChargeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeKind::Print => "print",
            ChargeKind::Lamination => "lamination",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "print" => Some(ChargeKind::Print),
            "lamination" => Some(ChargeKind::Lamination),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChargeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A debit against a user for a print or lamination job.
///
/// Immutable once created. `amount` is strictly positive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeEvent {
    pub id: String,
    pub uid: String,
    pub kind: ChargeKind,
    pub amount: Cents,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// An income entry reducing debt or adding standing credit.
///
/// Immutable once created. `amount` is strictly positive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub id: String,
    pub uid: String,
    pub amount: Cents,
    pub timestamp: DateTime<Utc>,
    /// Display name of the payer; feeds the payment id slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One entry of a user's append-only history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LedgerEvent {
    Charge(ChargeEvent),
    Payment(PaymentEvent),
}

impl LedgerEvent {
    pub fn id(&self) -> &str {
        match self {
            LedgerEvent::Charge(c) => &c.id,
            LedgerEvent::Payment(p) => &p.id,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            LedgerEvent::Charge(c) => &c.uid,
            LedgerEvent::Payment(p) => &p.uid,
        }
    }

    pub fn amount(&self) -> Cents {
        match self {
            LedgerEvent::Charge(c) => c.amount,
            LedgerEvent::Payment(p) => p.amount,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::Charge(c) => c.timestamp,
            LedgerEvent::Payment(p) => p.timestamp,
        }
    }

    /// Storage/category label: `print`, `lamination` or `payment`.
    pub fn category(&self) -> &'static str {
        match self {
            LedgerEvent::Charge(c) => c.kind.as_str(),
            LedgerEvent::Payment(_) => "payment",
        }
    }
}

impl From<ChargeEvent> for LedgerEvent {
    fn from(c: ChargeEvent) -> Self {
        LedgerEvent::Charge(c)
    }
}

impl From<PaymentEvent> for LedgerEvent {
    fn from(p: PaymentEvent) -> Self {
        LedgerEvent::Payment(p)
    }
}

/// The allocator's working state. All three buckets are `>= 0`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocState {
    pub print_debt: Cents,
    pub lamination_debt: Cents,
    pub credit: Cents,
}

impl AllocState {
    pub const ZERO: AllocState = AllocState {
        print_debt: Cents::ZERO,
        lamination_debt: Cents::ZERO,
        credit: Cents::ZERO,
    };

    /// Signed net position: positive = owes, negative = standing credit.
    /// `None` when the debts do not fit in one `Cents`.
    pub fn checked_total_debt(&self) -> Option<Cents> {
        self.print_debt
            .checked_add(self.lamination_debt)?
            .checked_sub(self.credit)
    }

    pub fn is_non_negative(&self) -> bool {
        !self.print_debt.is_negative()
            && !self.lamination_debt.is_negative()
            && !self.credit.is_negative()
    }
}

/// Money moved into the shared pools by one allocator step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDelta {
    pub print_bank: Cents,
    pub lamination_bank: Cents,
}

impl BankDelta {
    pub const ZERO: BankDelta = BankDelta {
        print_bank: Cents::ZERO,
        lamination_bank: Cents::ZERO,
    };

    pub fn is_zero(&self) -> bool {
        self.print_bank.is_zero() && self.lamination_bank.is_zero()
    }

    pub fn checked_total(&self) -> Option<Cents> {
        self.print_bank.checked_add(self.lamination_bank)
    }

    pub fn checked_add(self, rhs: BankDelta) -> Option<BankDelta> {
        Some(BankDelta {
            print_bank: self.print_bank.checked_add(rhs.print_bank)?,
            lamination_bank: self.lamination_bank.checked_add(rhs.lamination_bank)?,
        })
    }
}

/// Persisted per-user projection.
///
/// `credit` is never stored: it is `max(0, -total_debt)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    pub uid: String,
    pub print_debt: Cents,
    pub lamination_debt: Cents,
    pub total_debt: Cents,
    pub last_payment: Option<DateTime<Utc>>,
}

impl UserBalance {
    /// Starting state for a user with no balance document.
    pub fn zero(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            print_debt: Cents::ZERO,
            lamination_debt: Cents::ZERO,
            total_debt: Cents::ZERO,
            last_payment: None,
        }
    }

    pub fn from_state(
        uid: impl Into<String>,
        state: AllocState,
        last_payment: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            uid: uid.into(),
            print_debt: state.print_debt,
            lamination_debt: state.lamination_debt,
            total_debt: state.checked_total_debt().ok_or(ValidationError::TotalOverflow)?,
            last_payment,
        })
    }

    pub fn credit(&self) -> Cents {
        self.total_debt.saturating_neg().clamp_non_negative()
    }

    /// Allocator view of the stored document. Debts are clamped at zero so a
    /// hand-edited negative column cannot leak into the waterfall.
    pub fn state(&self) -> AllocState {
        AllocState {
            print_debt: self.print_debt.clamp_non_negative(),
            lamination_debt: self.lamination_debt.clamp_non_negative(),
            credit: self.credit(),
        }
    }

    /// `print_debt + lamination_debt - credit == total_debt`.
    pub fn is_conserved(&self) -> bool {
        self.print_debt
            .checked_add(self.lamination_debt)
            .and_then(|d| d.checked_sub(self.credit()))
            == Some(self.total_debt)
    }
}

/// Organization-wide collected money, partitioned by category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankState {
    pub print_bank: Cents,
    pub lamination_bank: Cents,
    pub last_updated: Option<DateTime<Utc>>,
}

impl BankState {
    /// Apply an additive increment. Zero deltas leave `last_updated` alone.
    ///
    /// On overflow nothing is changed.
    pub fn apply_delta(
        &mut self,
        delta: BankDelta,
        at: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if delta.is_zero() {
            return Ok(());
        }
        let print_bank = self
            .print_bank
            .checked_add(delta.print_bank)
            .ok_or(ValidationError::TotalOverflow)?;
        let lamination_bank = self
            .lamination_bank
            .checked_add(delta.lamination_bank)
            .ok_or(ValidationError::TotalOverflow)?;
        self.print_bank = print_bank;
        self.lamination_bank = lamination_bank;
        self.last_updated = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_is_derived_from_negative_total() {
        let mut b = UserBalance::zero("u1");
        b.total_debt = Cents::new(-250);
        assert_eq!(b.credit(), Cents::new(250));
        assert!(b.is_conserved());

        b.total_debt = Cents::new(400);
        b.print_debt = Cents::new(400);
        assert_eq!(b.credit(), Cents::ZERO);
        assert!(b.is_conserved());
    }

    #[test]
    fn ledger_event_json_is_tagged() {
        let ev = LedgerEvent::Charge(ChargeEvent {
            id: "print-u1-1".to_string(),
            uid: "u1".to_string(),
            kind: ChargeKind::Print,
            amount: Cents::new(750),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            note: None,
        });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "charge");
        assert_eq!(json["kind"], "print");
        assert_eq!(json["amount"], 7.5);

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn user_balance_uses_camel_case_contract() {
        let b = UserBalance::zero("u1");
        let json = serde_json::to_value(&b).unwrap();
        assert!(json.get("printDebt").is_some());
        assert!(json.get("laminationDebt").is_some());
        assert!(json.get("totalDebt").is_some());
        assert!(json["lastPayment"].is_null());
    }

    #[test]
    fn bank_zero_delta_keeps_timestamp() {
        let mut bank = BankState::default();
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        bank.apply_delta(BankDelta::ZERO, t).unwrap();
        assert_eq!(bank.last_updated, None);

        bank.apply_delta(
            BankDelta {
                print_bank: Cents::new(100),
                lamination_bank: Cents::ZERO,
            },
            t,
        )
        .unwrap();
        assert_eq!(bank.print_bank, Cents::new(100));
        assert_eq!(bank.last_updated, Some(t));
    }

    #[test]
    fn bank_overflow_is_rejected_and_leaves_totals_alone() {
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut bank = BankState {
            print_bank: Cents::new(10),
            lamination_bank: Cents::new(i64::MAX - 5),
            last_updated: None,
        };
        let err = bank
            .apply_delta(
                BankDelta {
                    print_bank: Cents::new(1),
                    lamination_bank: Cents::new(6),
                },
                t,
            )
            .unwrap_err();
        assert_eq!(err, ValidationError::TotalOverflow);
        assert_eq!(bank.print_bank, Cents::new(10));
        assert_eq!(bank.last_updated, None);
    }

    #[test]
    fn alloc_state_total_debt_overflow_is_none() {
        let s = AllocState {
            print_debt: Cents::new(i64::MAX),
            lamination_debt: Cents::new(1),
            credit: Cents::ZERO,
        };
        assert_eq!(s.checked_total_debt(), None);
    }

    #[test]
    fn charge_kind_parse() {
        assert_eq!(ChargeKind::parse(" Print "), Some(ChargeKind::Print));
        assert_eq!(ChargeKind::parse("lamination"), Some(ChargeKind::Lamination));
        assert_eq!(ChargeKind::parse("binding"), None);
    }
}
