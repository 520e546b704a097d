//! Fixed-point money type.
//!
//! # Motivation
//!
//! Every amount in the ledger (charges, payments, debts, credit, bank totals)
//! has exactly two fractional digits.  Storing them as binary floats means
//! every subtraction can leave a residue that must be rounded away again, and
//! thousands of small allocations accumulate drift.
//!
//! `Cents` wraps an `i64` count of hundredths so arithmetic is exact.  The only
//! place rounding happens is the I/O boundary: [`Cents::parse_decimal`] and
//! [`Cents::from_f64_rounded`] convert a decimal amount into cents, rounding
//! half away from zero at the second fractional digit.
//!
//! # Scale
//!
//! 1 unit of currency = `Cents(100)`.  There is no `From<i64>` impl; callers
//! construct cents deliberately with [`Cents::new`] or [`Cents::from_units`].
//!
//! # Serde
//!
//! Serialized as a JSON number with at most two fractional digits
//! (`12.5`, `-3.25`), which is the persisted field contract.  Deserialization
//! accepts numbers or decimal strings and routes both through
//! [`Cents::parse_decimal`], so `7.499999999` never sneaks in as `7.49`.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of cents in one currency unit.
pub const CENTS_SCALE: i64 = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure converting an external amount into [`Cents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The text is not a plain decimal number (`12`, `12.5`, `-0.07`).
    Malformed { input: String },
    /// The amount does not fit in `i64` cents.
    Overflow { input: String },
    /// NaN or an infinity was supplied.
    NotFinite,
}

impl std::fmt::Display for MoneyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { input } => write!(f, "malformed money amount: {input:?}"),
            Self::Overflow { input } => write!(f, "money amount out of range: {input:?}"),
            Self::NotFinite => write!(f, "money amount must be a finite number"),
        }
    }
}

impl std::error::Error for MoneyError {}

// ---------------------------------------------------------------------------
// Cents newtype
// ---------------------------------------------------------------------------

/// A fixed-point monetary amount with two fractional digits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Largest amount a single event may carry: 1 000 000 000.00.
    ///
    /// Keeps every running total many orders of magnitude below `i64::MAX`.
    pub const MAX_AMOUNT: Cents = Cents(100_000_000_000);

    /// Construct from a raw count of cents.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Cents(raw)
    }

    /// Construct from whole currency units (`from_units(7) == 7.00`).
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Cents(units * CENTS_SCALE)
    }

    /// Extract the raw cent count (database columns, hashing).
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Clamp at zero: negative amounts become `ZERO`.
    #[inline]
    pub fn clamp_non_negative(self) -> Cents {
        Cents(self.0.max(0))
    }

    #[inline]
    pub fn checked_add(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_add(rhs.0).map(Cents)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_sub(rhs.0).map(Cents)
    }

    #[inline]
    pub fn saturating_add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_neg(self) -> Cents {
        Cents(self.0.saturating_neg())
    }

    /// Decimal value as `f64`. Only for serialization at the boundary.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / CENTS_SCALE as f64
    }

    /// Round a float to the nearest cent, half away from zero.
    ///
    /// Goes through the shortest round-trip decimal rendering of `value` so
    /// that `1.005` rounds to `1.01` the way a human reads it, not to `1.00`
    /// the way its binary approximation would.
    pub fn from_f64_rounded(value: f64) -> Result<Cents, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::NotFinite);
        }
        Cents::parse_decimal(&format!("{value}"))
    }

    /// Parse a plain decimal string, rounding to two fractional digits
    /// (half away from zero).
    pub fn parse_decimal(input: &str) -> Result<Cents, MoneyError> {
        let malformed = || MoneyError::Malformed {
            input: input.to_string(),
        };
        let overflow = || MoneyError::Overflow {
            input: input.to_string(),
        };

        let s = input.trim();
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(malformed());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }

        let mut units: i64 = 0;
        for b in int_part.bytes() {
            units = units
                .checked_mul(10)
                .and_then(|u| u.checked_add(i64::from(b - b'0')))
                .ok_or_else(overflow)?;
        }

        let frac = frac_part.as_bytes();
        let digit = |i: usize| frac.get(i).map(|b| i64::from(b - b'0')).unwrap_or(0);
        let mut cents = digit(0) * 10 + digit(1);
        if digit(2) >= 5 {
            cents += 1;
        }

        let magnitude = units
            .checked_mul(CENTS_SCALE)
            .and_then(|u| u.checked_add(cents))
            .ok_or_else(overflow)?;

        Ok(Cents(if negative { -magnitude } else { magnitude }))
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators (closed over Cents)
//
// Plain `i64` semantics: these panic on overflow in debug builds. Ledger
// totals go through `checked_add` / `checked_sub`; the operators are only
// used where the operands are already bounded.
// ---------------------------------------------------------------------------

impl Add for Cents {
    type Output = Cents;
    #[inline]
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Cents;
    #[inline]
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Cents;
    #[inline]
    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

impl AddAssign for Cents {
    #[inline]
    fn add_assign(&mut self, rhs: Cents) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Cents {
    #[inline]
    fn sub_assign(&mut self, rhs: Cents) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, |acc, c| acc + c)
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl std::fmt::Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / CENTS_SCALE;
        let frac = (self.0 % CENTS_SCALE).abs();
        // -0.xx: integer division drops the sign, emit it explicitly.
        if self.0 < 0 && units == 0 {
            write!(f, "-{units}.{frac:02}")
        } else {
            write!(f, "{units}.{frac:02}")
        }
    }
}

impl std::str::FromStr for Cents {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cents::parse_decimal(s)
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

impl Serialize for Cents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

struct CentsVisitor;

impl<'de> Visitor<'de> for CentsVisitor {
    type Value = Cents;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a decimal amount as a number or string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cents, E> {
        v.checked_mul(CENTS_SCALE)
            .map(Cents)
            .ok_or_else(|| E::custom(MoneyError::Overflow { input: v.to_string() }))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cents, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(CENTS_SCALE))
            .map(Cents)
            .ok_or_else(|| E::custom(MoneyError::Overflow { input: v.to_string() }))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Cents, E> {
        Cents::from_f64_rounded(v).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Cents, E> {
        Cents::parse_decimal(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Cents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Cents, D::Error> {
        deserializer.deserialize_any(CentsVisitor)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
