//! Shared runtime state for tally-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine and the
//! scheduler are cheap `Clone` handles over the shared store.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tally_engine::{Engine, MemoryStore, ReconcileReport, ReconcileScheduler};
use tally_ledger::{BankState, UserBalance};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Balance(UserBalance),
    Bank(BankState),
    Reconcile(ReconcileReport),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Balance(_) => "balance",
            BusMsg::Bank(_) => "bank",
            BusMsg::Reconcile(_) => "reconcile",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: Engine,
    /// Trailing reconcile passes after payments.
    pub scheduler: ReconcileScheduler,
    pub reconcile_after_payment: bool,
}

impl AppState {
    pub fn new(engine: Engine, reconcile_after_payment: bool) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let scheduler = ReconcileScheduler::new(engine.clone());
        Self {
            bus,
            build: BuildInfo {
                service: "tally-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine,
            scheduler,
            reconcile_after_payment,
        }
    }

    /// Fresh in-memory ledger with default retry policy.
    pub fn in_memory() -> Self {
        Self::new(Engine::new(Arc::new(MemoryStore::new())), true)
    }

    pub fn log(&self, level: &str, msg: impl Into<String>) {
        let _ = self.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.into(),
        });
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Forward every completed trailing reconcile pass onto the SSE bus.
pub fn spawn_reconcile_forwarder(state: &AppState) {
    let mut reports = state.scheduler.subscribe();
    let bus = state.bus.clone();
    tokio::spawn(async move {
        loop {
            match reports.recv().await {
                Ok(report) => {
                    let _ = bus.send(BusMsg::Balance(report.rebuilt.clone()));
                    let _ = bus.send(BusMsg::Reconcile(report));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "reconcile forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
