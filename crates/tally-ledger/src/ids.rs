//! Event id generation.
//!
//! Payment ids follow `<payer-slug>-<dd>-<mm>-<yyyy>-<amount>-<suffix>`, e.g.
//! `maria-k-03-11-2025-12.50-9f2c1a7e`. Charge ids follow
//! `<kind>-<uid>-<epoch millis>-<suffix>`. The random suffix keeps two
//! submissions with identical visible fields from colliding.
//!
//! The formatting functions are pure; only [`random_suffix`] touches an RNG.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::money::Cents;
use crate::types::ChargeKind;

const SUFFIX_LEN: usize = 8;

/// Lowercase, whitespace runs → `-`, drop everything outside `[a-z0-9-]`.
///
/// Returns `"unknown"` when nothing survives (e.g. a non-Latin name).
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            pending_dash = true;
            continue;
        }
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        }
    }
    if out.is_empty() {
        "unknown".to_string()
    } else {
        out
    }
}

/// Random `[0-9a-f]` suffix.
pub fn random_suffix() -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(SUFFIX_LEN);
    s
}

pub fn format_payment_id(payer: &str, at: DateTime<Utc>, amount: Cents, suffix: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        slugify(payer),
        at.format("%d-%m-%Y"),
        amount,
        suffix
    )
}

pub fn format_charge_id(kind: ChargeKind, uid: &str, at: DateTime<Utc>, suffix: &str) -> String {
    format!("{}-{}-{}-{}", kind, uid, at.timestamp_millis(), suffix)
}

/// New payment id with a random suffix.
pub fn new_payment_id(payer: &str, at: DateTime<Utc>, amount: Cents) -> String {
    format_payment_id(payer, at, amount, &random_suffix())
}

/// New charge id with a random suffix.
pub fn new_charge_id(kind: ChargeKind, uid: &str, at: DateTime<Utc>) -> String {
    format_charge_id(kind, uid, at, &random_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("  Maria   K. "), "maria-k");
        assert_eq!(slugify("User_400"), "user400");
        assert_eq!(slugify("Ναός"), "unknown");
        assert_eq!(slugify(""), "unknown");
    }

    #[test]
    fn payment_id_layout() {
        let at = Utc.with_ymd_and_hms(2025, 11, 3, 9, 30, 0).unwrap();
        let id = format_payment_id("Maria K", at, Cents::new(1250), "abc123");
        assert_eq!(id, "maria-k-03-11-2025-12.50-abc123");
    }

    #[test]
    fn charge_id_layout() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let id = format_charge_id(ChargeKind::Lamination, "u9", at, "ff00ff00");
        assert_eq!(id, "lamination-u9-1700000000123-ff00ff00");
    }

    #[test]
    fn random_suffixes_differ() {
        let a = random_suffix();
        let b = random_suffix();
        assert_eq!(a.len(), SUFFIX_LEN);
        assert_ne!(a, b);
    }
}
