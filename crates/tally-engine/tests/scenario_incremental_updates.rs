use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tally_engine::{Engine, EngineError, LedgerStore, MemoryStore, NewCharge, NewPayment};
use tally_ledger::{rebuild_balance, Cents, ChargeEvent, ChargeKind, LedgerEvent, ValidationError};

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn charge(uid: &str, kind: ChargeKind, cents: i64, at: i64) -> NewCharge {
    NewCharge {
        uid: uid.to_string(),
        kind,
        amount: Cents::new(cents),
        timestamp: ts(at),
        id: None,
        note: None,
    }
}

fn payment(uid: &str, cents: i64, at: i64) -> NewPayment {
    NewPayment {
        uid: uid.to_string(),
        amount: Cents::new(cents),
        timestamp: ts(at),
        payer: Some("Maria K".to_string()),
        note: None,
    }
}

#[tokio::test]
async fn scenario_missing_user_starts_from_zero() {
    let engine = Engine::new(Arc::new(MemoryStore::new()));
    let applied = engine
        .submit_charge(charge("u1", ChargeKind::Print, 450, 1))
        .await
        .unwrap();
    assert_eq!(applied.balance.print_debt, Cents::new(450));
    assert_eq!(applied.balance.total_debt, Cents::new(450));
    assert_eq!(applied.attempts, 1);
    assert!(applied.bank_delta.is_zero());
    assert!(applied.event_id.starts_with("print-u1-1000-"));
}

#[tokio::test]
async fn scenario_payment_moves_bank_and_builds_credit() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone());

    engine
        .submit_charge(charge("u1", ChargeKind::Print, 2_000, 1))
        .await
        .unwrap();
    engine
        .submit_charge(charge("u1", ChargeKind::Lamination, 1_500, 2))
        .await
        .unwrap();
    let applied = engine.submit_payment(payment("u1", 5_000, 3)).await.unwrap();

    assert_eq!(applied.balance.print_debt, Cents::ZERO);
    assert_eq!(applied.balance.lamination_debt, Cents::ZERO);
    assert_eq!(applied.balance.total_debt, Cents::new(-1_500));
    assert_eq!(applied.balance.credit(), Cents::new(1_500));
    assert_eq!(applied.balance.last_payment, Some(ts(3)));

    assert_eq!(applied.bank.lamination_bank, Cents::new(1_500));
    assert_eq!(applied.bank.print_bank, Cents::new(3_500));
    assert_eq!(applied.bank, store.read_bank().await.unwrap());
    assert!(applied.event_id.starts_with("maria-k-01-01-1970-50.00-"));
}

#[tokio::test]
async fn scenario_incremental_path_agrees_with_rebuild() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone());

    engine
        .submit_charge(charge("u1", ChargeKind::Print, 1_000, 1))
        .await
        .unwrap();
    engine.submit_payment(payment("u1", 1_500, 2)).await.unwrap();
    let last = engine
        .submit_charge(charge("u1", ChargeKind::Lamination, 800, 3))
        .await
        .unwrap();

    let events = store.load_events("u1").await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(last.balance, rebuild_balance("u1", &events).unwrap());
    assert_eq!(last.balance.lamination_debt, Cents::new(300));
}

#[tokio::test]
async fn scenario_invalid_input_never_reaches_the_store() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone());

    let err = engine
        .submit_charge(charge("u1", ChargeKind::Print, 0, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Invalid(ValidationError::NonPositiveAmount { .. })
    ));

    let err = engine.submit_payment(payment("", 100, 1)).await.unwrap_err();
    assert!(matches!(err, EngineError::Invalid(ValidationError::EmptyUid)));

    assert_eq!(store.event_count().await, 0);
    assert_eq!(store.read_bank().await.unwrap().last_updated, None);
}

#[tokio::test]
async fn scenario_duplicate_charge_id_is_rejected_without_retry() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone());

    let mut c = charge("u1", ChargeKind::Print, 100, 1);
    c.id = Some("job-42".to_string());
    engine.submit_charge(c.clone()).await.unwrap();

    let err = engine.submit_charge(c).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateEvent { ref id } if id == "job-42"));
    assert!(!err.is_retryable());
    assert_eq!(engine.balance("u1").await.unwrap().print_debt, Cents::new(100));
}

#[tokio::test]
async fn scenario_bank_accumulates_across_users() {
    let engine = Engine::new(Arc::new(MemoryStore::new()));
    engine.submit_payment(payment("a", 1_000, 1)).await.unwrap();
    engine.submit_payment(payment("b", 250, 1)).await.unwrap();
    let bank = engine.bank().await.unwrap();
    assert_eq!(bank.print_bank, Cents::new(1_250));
    assert_eq!(bank.lamination_bank, Cents::ZERO);
    assert_eq!(
        bank.last_updated.map(|t| t > Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()),
        Some(true)
    );
}

#[tokio::test]
async fn scenario_oversized_amounts_are_rejected_not_overflowed() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone());

    // 500 000 000 000 000.00 each; two of them would not fit in i64 cents.
    let huge = 50_000_000_000_000_000;
    for at in [1, 2] {
        let err = engine
            .submit_charge(charge("u1", ChargeKind::Print, huge, at))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Invalid(ValidationError::AmountTooLarge { .. })
        ));
    }

    assert_eq!(store.event_count().await, 0);
    assert_eq!(engine.balance("u1").await.unwrap().total_debt, Cents::ZERO);
}

#[tokio::test]
async fn scenario_charge_that_would_overflow_a_bucket_is_rejected() {
    let imported = LedgerEvent::Charge(ChargeEvent {
        id: "legacy-1".to_string(),
        uid: "u1".to_string(),
        kind: ChargeKind::Print,
        amount: Cents::new(i64::MAX - 10),
        timestamp: ts(1),
        note: None,
    });
    let store = Arc::new(MemoryStore::with_events([imported]));
    let engine = Engine::new(store.clone());
    engine.reconcile_user("u1").await.unwrap();

    let err = engine
        .submit_charge(charge("u1", ChargeKind::Print, 100, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Invalid(ValidationError::TotalOverflow)));
    assert!(!err.is_retryable());

    assert_eq!(store.event_count().await, 1);
    assert_eq!(
        engine.balance("u1").await.unwrap().print_debt,
        Cents::new(i64::MAX - 10)
    );
}
