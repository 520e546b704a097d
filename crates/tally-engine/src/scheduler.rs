//! Trailing Full Reconciler passes scheduled after payments.
//!
//! Passes for one uid are chained: each waits for the previous one before it
//! reads history, so they run one at a time in scheduling order. Different
//! uids run independently. A uid is *settled* when no pass is queued or
//! running; only then is its stored balance authoritative.
//!
//! A pass that errors or panics still counts as finished. Once a uid settles
//! its queue entry is dropped, so the map only holds uids with work in flight.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::engine::Engine;
use crate::reconcile::ReconcileReport;

struct UidQueue {
    pending: Arc<watch::Sender<usize>>,
    tail: Option<JoinHandle<()>>,
}

impl UidQueue {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(0usize);
        Self {
            pending: Arc::new(tx),
            tail: None,
        }
    }
}

#[derive(Clone)]
pub struct ReconcileScheduler {
    engine: Engine,
    queues: Arc<Mutex<HashMap<String, UidQueue>>>,
    reports: broadcast::Sender<ReconcileReport>,
}

impl ReconcileScheduler {
    pub fn new(engine: Engine) -> Self {
        let (reports, _rx) = broadcast::channel(256);
        Self {
            engine,
            queues: Arc::new(Mutex::new(HashMap::new())),
            reports,
        }
    }

    /// Every completed trailing pass is published here.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileReport> {
        self.reports.subscribe()
    }

    /// Queue a pass for `uid` behind any pass already queued for it.
    /// Returns immediately; the pass runs on the tokio runtime.
    pub async fn schedule(&self, uid: &str) {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(uid.to_string()).or_insert_with(UidQueue::new);
        queue.pending.send_modify(|n| *n += 1);

        let prev = queue.tail.take();
        let pending = Arc::clone(&queue.pending);
        let engine = self.engine.clone();
        let reports = self.reports.clone();
        let queues_ref = Arc::clone(&self.queues);
        let uid = uid.to_string();

        queue.tail = Some(tokio::spawn(async move {
            if let Some(prev) = prev {
                let _ = prev.await;
            }

            // Run the pass in its own task so a panic surfaces as a JoinError
            // here instead of skipping the bookkeeping below.
            let pass = {
                let uid = uid.clone();
                tokio::spawn(async move { engine.reconcile_user(&uid).await })
            };
            match pass.await {
                Ok(Ok(report)) => {
                    // No subscribers is fine.
                    let _ = reports.send(report);
                }
                Ok(Err(err)) => warn!(uid = %uid, error = %err, "trailing reconcile failed"),
                Err(err) => error!(uid = %uid, error = %err, "trailing reconcile aborted"),
            }

            finish_pass(&queues_ref, &uid, &pending).await;
        }));
    }

    /// Number of uids with a pass queued or running.
    pub async fn tracked_uids(&self) -> usize {
        self.queues.lock().await.len()
    }

    /// `true` when no pass for `uid` is queued or running.
    pub async fn is_settled(&self, uid: &str) -> bool {
        let queues = self.queues.lock().await;
        queues
            .get(uid)
            .map(|q| *q.pending.borrow() == 0)
            .unwrap_or(true)
    }

    /// Wait until every pass queued for `uid` so far has finished.
    pub async fn settle(&self, uid: &str) {
        let rx = {
            let queues = self.queues.lock().await;
            match queues.get(uid) {
                Some(q) => q.pending.subscribe(),
                None => return,
            }
        };
        wait_zero(rx).await;
    }

    /// Wait for every uid.
    pub async fn settle_all(&self) {
        let receivers: Vec<_> = {
            let queues = self.queues.lock().await;
            queues.values().map(|q| q.pending.subscribe()).collect()
        };
        for rx in receivers {
            wait_zero(rx).await;
        }
    }
}

/// Count one pass as done and forget the uid once nothing newer is queued.
///
/// Runs under the map lock so a concurrent `schedule` either sees the entry
/// before removal or creates a fresh one after it.
async fn finish_pass(
    queues: &Mutex<HashMap<String, UidQueue>>,
    uid: &str,
    pending: &Arc<watch::Sender<usize>>,
) {
    let mut queues = queues.lock().await;
    pending.send_modify(|n| *n = n.saturating_sub(1));
    let idle = queues
        .get(uid)
        .map(|q| Arc::ptr_eq(&q.pending, pending) && *q.pending.borrow() == 0)
        .unwrap_or(false);
    if idle {
        queues.remove(uid);
    }
}

async fn wait_zero(mut rx: watch::Receiver<usize>) {
    // Err = sender dropped, i.e. the scheduler is gone; nothing left to wait on.
    let _ = rx.wait_for(|n| *n == 0).await;
}
