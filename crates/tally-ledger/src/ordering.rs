//! Event ordering policy.
//!
//! Defines the canonical replay order for a user's history. The allocator is
//! order-sensitive (a payment before a charge creates credit, after it pays
//! debt), so the same set of events must always replay in the same order no
//! matter how the store returned them.
//!
//! # Canonical sort key
//!
//! `(timestamp, id, kind_ord, amount)` ascending.
//! `kind_ord`: `print = 0`, `lamination = 1`, `payment = 2`. Event ids are
//! unique, so in practice the key stops at `id`; the tail only matters for
//! hand-built batches that reuse an id.

use std::cmp::Ordering;

use crate::types::{ChargeKind, LedgerEvent};

fn kind_ord(ev: &LedgerEvent) -> u8 {
    match ev {
        LedgerEvent::Charge(c) => match c.kind {
            ChargeKind::Print => 0,
            ChargeKind::Lamination => 1,
        },
        LedgerEvent::Payment(_) => 2,
    }
}

/// Total order used for replay.
pub fn canonical_cmp(a: &LedgerEvent, b: &LedgerEvent) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| a.id().cmp(b.id()))
        .then_with(|| kind_ord(a).cmp(&kind_ord(b)))
        .then_with(|| a.amount().cmp(&b.amount()))
}

/// Sort `events` into canonical order in place.
pub fn sort_events_canonical(events: &mut [LedgerEvent]) {
    events.sort_by(canonical_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Cents;
    use crate::types::{ChargeEvent, PaymentEvent};
    use chrono::DateTime;

    fn charge(id: &str, ts: i64) -> LedgerEvent {
        LedgerEvent::Charge(ChargeEvent {
            id: id.to_string(),
            uid: "u".to_string(),
            kind: ChargeKind::Print,
            amount: Cents::new(100),
            timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
            note: None,
        })
    }

    fn payment(id: &str, ts: i64) -> LedgerEvent {
        LedgerEvent::Payment(PaymentEvent {
            id: id.to_string(),
            uid: "u".to_string(),
            amount: Cents::new(100),
            timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
            payer: None,
            note: None,
        })
    }

    #[test]
    fn timestamp_is_primary_key() {
        let mut evs = vec![charge("a", 20), payment("z", 10)];
        sort_events_canonical(&mut evs);
        assert_eq!(evs[0].id(), "z");
    }

    #[test]
    fn id_breaks_timestamp_ties() {
        let mut evs = vec![charge("b", 10), payment("a", 10)];
        sort_events_canonical(&mut evs);
        assert_eq!(evs[0].id(), "a");
        assert_eq!(evs[1].id(), "b");
    }

    #[test]
    fn sort_is_idempotent() {
        let mut evs = vec![charge("c", 5), payment("a", 5), charge("b", 1)];
        sort_events_canonical(&mut evs);
        let once = evs.clone();
        sort_events_canonical(&mut evs);
        assert_eq!(evs, once);
    }
}
