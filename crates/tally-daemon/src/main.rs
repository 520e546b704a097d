//! tally-daemon entry point.
//!
//! Thin on purpose: load config, pick a store, build the shared state, wire
//! middleware and serve. Route handlers live in `routes.rs`; shared state
//! types in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use axum::http::{HeaderValue, Method};
use tally_config::{Settings, StoreBackend, Surface, UnusedKeyPolicy};
use tally_daemon::{routes, state};
use tally_engine::{Engine, LedgerStore, MemoryStore, RetryPolicy};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = tally_config::load_from_env()?;
    let report =
        tally_config::report_unused_keys(Surface::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &report.unused_leaf_pointers {
        warn!(key = %ptr, "config key not consumed by the daemon");
    }
    let settings = loaded.settings()?;
    info!(config_hash = %loaded.config_hash, backend = ?settings.store.backend, "config loaded");

    let store = open_store(&settings).await?;
    let policy = RetryPolicy::new(settings.engine.max_attempts, settings.engine.backoff_ms);
    let engine = Engine::with_policy(store, policy);

    let shared = Arc::new(state::AppState::new(
        engine,
        settings.engine.reconcile_after_payment,
    ));

    state::spawn_heartbeat(
        shared.bus.clone(),
        Duration::from_secs(settings.daemon.heartbeat_secs.max(1)),
    );
    state::spawn_reconcile_forwarder(&shared);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(addr) => addr,
        None => settings
            .daemon
            .addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid daemon.addr '{}'", settings.daemon.addr))?,
    };
    info!("tally-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    // Let queued trailing passes finish before the process exits.
    shared.scheduler.settle_all().await;
    info!("tally-daemon stopped");

    Ok(())
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match settings.store.backend {
        StoreBackend::Memory => {
            warn!("using in-memory store; state is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = tally_db::connect_from_env_with(settings.store.max_connections).await?;
            let status = tally_db::status(&pool).await?;
            if !status.has_ledger_tables {
                bail!("ledger tables missing; run `tally db migrate` first");
            }
            info!(events = status.event_count, "postgres store ready");
            Ok(Arc::new(tally_db::PgLedgerStore::new(pool)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("TALLY_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
