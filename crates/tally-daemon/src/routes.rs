//! Axum router and all HTTP handlers for tally-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Tests compose the bare router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tally_engine::{EngineError, NewCharge, NewPayment};
use tally_ledger::{time::normalize_or, Cents, ChargeKind};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};

use crate::{
    api_types::{
        AppliedResponse, BalanceResponse, ChargeRequest, ErrorResponse, HealthResponse,
        PaymentRequest, ReconcileAllResponse,
    },
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/charges", post(submit_charge))
        .route("/v1/payments", post(submit_payment))
        .route("/v1/users/:uid/balance", get(user_balance))
        .route("/v1/users/:uid/reconcile", post(reconcile_user))
        .route("/v1/reconcile", post(reconcile_all))
        .route("/v1/bank", get(bank))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler error: status + `{error, retryable}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: msg.into(),
                retryable: false,
            },
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Invalid(_) => StatusCode::BAD_REQUEST,
            EngineError::Conflict { .. } | EngineError::DuplicateEvent { .. } => StatusCode::CONFLICT,
            EngineError::Store(_) => {
                error!(error = %err, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                retryable: err.is_retryable(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rej: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request body: {}", rej.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn require_amount(amount: Option<Cents>) -> Result<Cents, ApiError> {
    amount.ok_or_else(|| ApiError::bad_request("amount is required"))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/charges
// ---------------------------------------------------------------------------

pub(crate) async fn submit_charge(
    State(st): State<Arc<AppState>>,
    body: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<Json<AppliedResponse>, ApiError> {
    let Json(req) = body?;
    let kind = ChargeKind::parse(&req.kind).ok_or_else(|| {
        ApiError::bad_request(format!("kind must be 'print' or 'lamination', got '{}'", req.kind))
    })?;
    let amount = require_amount(req.amount)?;
    let timestamp = normalize_or(req.timestamp.as_ref(), Utc::now())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let applied = st
        .engine
        .submit_charge(NewCharge {
            uid: req.uid,
            kind,
            amount,
            timestamp,
            id: req.id,
            note: req.note,
        })
        .await?;

    info!(uid = %applied.balance.uid, event_id = %applied.event_id, "charges/submit");
    let _ = st.bus.send(BusMsg::Balance(applied.balance.clone()));
    Ok(Json(AppliedResponse::from_applied(applied, false)))
}

// ---------------------------------------------------------------------------
// POST /v1/payments
// ---------------------------------------------------------------------------

pub(crate) async fn submit_payment(
    State(st): State<Arc<AppState>>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<AppliedResponse>, ApiError> {
    let Json(req) = body?;
    let amount = require_amount(req.amount)?;
    let timestamp = normalize_or(req.timestamp.as_ref(), Utc::now())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let applied = st
        .engine
        .submit_payment(NewPayment {
            uid: req.uid,
            amount,
            timestamp,
            payer: req.payer,
            note: req.note,
        })
        .await?;

    let uid = applied.balance.uid.clone();
    if st.reconcile_after_payment {
        st.scheduler.schedule(&uid).await;
    }

    info!(uid = %uid, event_id = %applied.event_id, "payments/submit");
    let _ = st.bus.send(BusMsg::Balance(applied.balance.clone()));
    let _ = st.bus.send(BusMsg::Bank(applied.bank.clone()));
    Ok(Json(AppliedResponse::from_applied(
        applied,
        st.reconcile_after_payment,
    )))
}

// ---------------------------------------------------------------------------
// GET /v1/users/:uid/balance
// ---------------------------------------------------------------------------

pub(crate) async fn user_balance(
    State(st): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = st.engine.balance(&uid).await?;
    let authoritative = st.scheduler.is_settled(&uid).await;
    Ok(Json(BalanceResponse {
        user,
        authoritative,
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/users/:uid/reconcile
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_user(
    State(st): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = st.engine.reconcile_user(&uid).await?;
    if !report.is_clean() {
        st.log("WARN", format!("reconcile corrected drift for {uid}"));
    }
    let _ = st.bus.send(BusMsg::Reconcile(report.clone()));
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_all(
    State(st): State<Arc<AppState>>,
) -> Result<Json<ReconcileAllResponse>, ApiError> {
    let reports = st.engine.reconcile_all().await?;
    let drifted = reports.iter().filter(|r| !r.is_clean()).count();
    st.log(
        if drifted == 0 { "INFO" } else { "WARN" },
        format!("reconciled {} users, {} drifted", reports.len(), drifted),
    );
    Ok(Json(ReconcileAllResponse { reports }))
}

// ---------------------------------------------------------------------------
// GET /v1/bank
// ---------------------------------------------------------------------------

pub(crate) async fn bank(State(st): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(st.engine.bank().await?))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
