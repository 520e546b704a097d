//! Request and response types for all tally-daemon HTTP endpoints.
//!
//! Field names are camelCase on the wire. Money is a decimal number (or a
//! decimal string on input); timestamps are RFC 3339 strings or epoch millis
//! on input, RFC 3339 on output. No business logic lives here.

use serde::{Deserialize, Serialize};
use tally_engine::{Applied, ReconcileReport};
use tally_ledger::{BankState, Cents, TimestampInput, UserBalance};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// true = resubmitting the same request may succeed.
    pub retryable: bool,
}

// ---------------------------------------------------------------------------
// POST /v1/charges  POST /v1/payments
// ---------------------------------------------------------------------------

/// Missing fields deserialize to empty/None so validation can answer with 400.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub amount: Option<Cents>,
    #[serde(default)]
    pub timestamp: Option<TimestampInput>,
    /// "print" | "lamination"
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub amount: Option<Cents>,
    #[serde(default)]
    pub timestamp: Option<TimestampInput>,
    #[serde(default)]
    pub payer: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResponse {
    pub ok: bool,
    pub user: UserBalance,
    pub bank: BankState,
    pub event_id: String,
    pub attempts: u32,
    /// A trailing reconcile pass was queued for this uid.
    pub reconcile_scheduled: bool,
}

impl AppliedResponse {
    pub fn from_applied(applied: Applied, reconcile_scheduled: bool) -> Self {
        Self {
            ok: true,
            user: applied.balance,
            bank: applied.bank,
            event_id: applied.event_id,
            attempts: applied.attempts,
            reconcile_scheduled,
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/users/:uid/balance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub user: UserBalance,
    /// false while a trailing reconcile pass for this uid is pending.
    pub authoritative: bool,
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileAllResponse {
    pub reports: Vec<ReconcileReport>,
}
