//! Full Reconciler: rebuild a user's balance from their complete history.
//!
//! The rebuild overwrites the stored document unconditionally (last writer
//! wins) and never touches bank totals. No lock is held against the
//! Incremental Updater; an event committed between the history read and the
//! overwrite can be masked until the next pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_ledger::{replay, Cents, UserBalance};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::EngineError;

/// One field on which the stored balance disagreed with the rebuild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceDrift {
    pub field: &'static str,
    pub stored: String,
    pub rebuilt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub uid: String,
    pub rebuilt: UserBalance,
    /// Document as stored before the overwrite; `None` if there was none.
    pub previous: Option<UserBalance>,
    pub events_replayed: usize,
    pub drift: Vec<BalanceDrift>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty()
    }
}

fn push_drift<T: PartialEq>(
    drift: &mut Vec<BalanceDrift>,
    field: &'static str,
    stored: &T,
    rebuilt: &T,
    render: impl Fn(&T) -> String,
) {
    if stored != rebuilt {
        drift.push(BalanceDrift {
            field,
            stored: render(stored),
            rebuilt: render(rebuilt),
        });
    }
}

fn render_ts(ts: &Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "null".to_string())
}

/// Field-by-field comparison in persisted-field order.
pub fn compare_balances(stored: &UserBalance, rebuilt: &UserBalance) -> Vec<BalanceDrift> {
    let mut drift = Vec::new();
    push_drift(&mut drift, "printDebt", &stored.print_debt, &rebuilt.print_debt, Cents::to_string);
    push_drift(
        &mut drift,
        "laminationDebt",
        &stored.lamination_debt,
        &rebuilt.lamination_debt,
        Cents::to_string,
    );
    push_drift(&mut drift, "totalDebt", &stored.total_debt, &rebuilt.total_debt, Cents::to_string);
    push_drift(
        &mut drift,
        "lastPayment",
        &stored.last_payment,
        &rebuilt.last_payment,
        render_ts,
    );
    drift
}

impl Engine {
    /// Replay `uid`'s history from zero and overwrite the stored balance.
    pub async fn reconcile_user(&self, uid: &str) -> Result<ReconcileReport, EngineError> {
        let events = self.store().load_events(uid).await?;
        let outcome = replay(uid, &events)?;

        let stored = self.store().read_balance(uid).await?;
        let previous = stored.exists().then(|| stored.balance.clone());
        let drift = compare_balances(&stored.balance, &outcome.balance);

        // Nothing to write for a uid that has neither a document nor history.
        if previous.is_some() || outcome.events_replayed > 0 {
            self.store().overwrite_balance(&outcome.balance).await?;
        }

        if drift.is_empty() {
            info!(uid = %uid, events = outcome.events_replayed, "reconcile clean");
        } else {
            let fields: Vec<&str> = drift.iter().map(|d| d.field).collect();
            warn!(uid = %uid, events = outcome.events_replayed, drift = ?fields, "reconcile corrected drift");
        }

        Ok(ReconcileReport {
            uid: uid.to_string(),
            rebuilt: outcome.balance,
            previous,
            events_replayed: outcome.events_replayed,
            drift,
        })
    }

    /// Reconcile every known uid, ascending. Stops at the first store error.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileReport>, EngineError> {
        let uids = self.store().list_uids().await?;
        let mut reports = Vec::with_capacity(uids.len());
        for uid in &uids {
            reports.push(self.reconcile_user(uid).await?);
        }
        let drifted = reports.iter().filter(|r| !r.is_clean()).count();
        info!(users = reports.len(), drifted, "reconcile_all done");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_balances_have_no_drift() {
        let b = UserBalance::zero("u");
        assert!(compare_balances(&b, &b).is_empty());
    }

    #[test]
    fn each_differing_field_is_reported_once() {
        let stored = UserBalance::zero("u");
        let mut rebuilt = UserBalance::zero("u");
        rebuilt.print_debt = Cents::new(500);
        rebuilt.total_debt = Cents::new(500);
        let drift = compare_balances(&stored, &rebuilt);
        let fields: Vec<_> = drift.iter().map(|d| d.field).collect();
        assert_eq!(fields, vec!["printDebt", "totalDebt"]);
        assert_eq!(drift[0].stored, "0.00");
        assert_eq!(drift[0].rebuilt, "5.00");
    }
}
