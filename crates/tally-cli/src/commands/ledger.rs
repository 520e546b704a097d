//! Ledger commands: charge, pay, balance, bank, reconcile.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tally_engine::{Applied, Engine, NewCharge, NewPayment, ReconcileReport, ReconcileScheduler};
use tally_ledger::{Cents, ChargeKind};

use super::{print_balance, print_bank, print_json};

pub struct ChargeArgs {
    pub uid: String,
    pub kind: ChargeKind,
    pub amount: Cents,
    pub at: Option<DateTime<Utc>>,
    pub id: Option<String>,
    pub note: Option<String>,
}

pub struct PayArgs {
    pub uid: String,
    pub amount: Cents,
    pub at: Option<DateTime<Utc>>,
    pub payer: Option<String>,
    pub note: Option<String>,
}

pub async fn charge(engine: &Engine, args: ChargeArgs) -> Result<()> {
    let applied = engine
        .submit_charge(NewCharge {
            uid: args.uid,
            kind: args.kind,
            amount: args.amount,
            timestamp: args.at.unwrap_or_else(Utc::now),
            id: args.id,
            note: args.note,
        })
        .await?;
    print_applied(&applied);
    Ok(())
}

/// Commit the payment, then run the trailing reconcile in-process when
/// configured. The process waits for it; nothing else would.
pub async fn pay(engine: &Engine, args: PayArgs, reconcile_after: bool) -> Result<()> {
    let applied = engine
        .submit_payment(NewPayment {
            uid: args.uid,
            amount: args.amount,
            timestamp: args.at.unwrap_or_else(Utc::now),
            payer: args.payer,
            note: args.note,
        })
        .await?;
    print_applied(&applied);

    if reconcile_after {
        let scheduler = ReconcileScheduler::new(engine.clone());
        let mut reports = scheduler.subscribe();
        let uid = applied.balance.uid.clone();
        scheduler.schedule(&uid).await;
        scheduler.settle(&uid).await;
        if let Ok(report) = reports.try_recv() {
            println!("reconciled=true drift_fields={}", report.drift.len());
        }
    }
    Ok(())
}

pub async fn balance(engine: &Engine, uid: &str, json: bool) -> Result<()> {
    let b = engine.balance(uid).await?;
    if json {
        return print_json(&b);
    }
    print_balance(&b);
    Ok(())
}

pub async fn bank(engine: &Engine, json: bool) -> Result<()> {
    let b = engine.bank().await?;
    if json {
        return print_json(&b);
    }
    print_bank(&b);
    Ok(())
}

pub async fn reconcile_user(engine: &Engine, uid: &str, json: bool) -> Result<()> {
    let report = engine.reconcile_user(uid).await?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

pub async fn reconcile_all(engine: &Engine, json: bool) -> Result<()> {
    let reports = engine.reconcile_all().await?;
    if json {
        return print_json(&reports);
    }
    for r in &reports {
        print_report(r);
    }
    let drifted = reports.iter().filter(|r| !r.is_clean()).count();
    println!("users={} drifted={}", reports.len(), drifted);
    Ok(())
}

fn print_applied(a: &Applied) {
    println!("event_id={}", a.event_id);
    println!("attempts={}", a.attempts);
    print_balance(&a.balance);
    print_bank(&a.bank);
}

fn print_report(r: &ReconcileReport) {
    println!(
        "uid={} events_replayed={} clean={} total_debt={}",
        r.uid,
        r.events_replayed,
        r.is_clean(),
        r.rebuilt.total_debt
    );
    for d in &r.drift {
        println!("  drift field={} stored={} rebuilt={}", d.field, d.stored, d.rebuilt);
    }
}
