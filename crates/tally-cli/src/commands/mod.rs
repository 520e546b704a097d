//! Command handler modules for the `tally` CLI.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod ledger;
pub mod snapshot;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tally_config::{Settings, Surface, UnusedKeyPolicy};
use tally_engine::{Engine, RetryPolicy};
use tally_ledger::{parse_timestamp, BankState, Cents, ChargeKind, UserBalance};

// ---------------------------------------------------------------------------
// Argument parsers (clap value_parser)
// ---------------------------------------------------------------------------

/// `--amount 12.50` → cents. Sign is checked later by ledger validation.
pub fn parse_amount(s: &str) -> std::result::Result<Cents, String> {
    Cents::parse_decimal(s).map_err(|e| e.to_string())
}

/// `--kind print|lamination`.
pub fn parse_kind(s: &str) -> std::result::Result<ChargeKind, String> {
    ChargeKind::parse(s).ok_or_else(|| format!("expected one of: print | lamination, got '{s}'"))
}

/// `--at 2025-03-01` or RFC 3339.
pub fn parse_at(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp(s).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Config + store bootstrap
// ---------------------------------------------------------------------------

/// Load layered config from `TALLY_CONFIG` and warn about keys the CLI ignores.
pub fn load_settings() -> Result<Settings> {
    let loaded = tally_config::load_from_env()?;
    let report = tally_config::report_unused_keys(Surface::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &report.unused_leaf_pointers {
        tracing::warn!(key = %ptr, "config key not consumed by the cli");
    }
    loaded.settings()
}

/// Engine over the Postgres store named by `TALLY_DATABASE_URL`.
///
/// The CLI is a one-shot process, so it always talks to Postgres regardless
/// of `store.backend`; an in-memory ledger would vanish on exit.
pub async fn open_engine(settings: &Settings) -> Result<Engine> {
    let pool = tally_db::connect_from_env_with(settings.store.max_connections).await?;
    let status = tally_db::status(&pool).await?;
    if !status.has_ledger_tables {
        anyhow::bail!("ledger tables missing; run `tally db migrate` first");
    }
    let policy = RetryPolicy::new(settings.engine.max_attempts, settings.engine.backoff_ms);
    Ok(Engine::with_policy(
        Arc::new(tally_db::PgLedgerStore::new(pool)),
        policy,
    ))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

pub fn print_balance(b: &UserBalance) {
    println!("uid={}", b.uid);
    println!("print_debt={}", b.print_debt);
    println!("lamination_debt={}", b.lamination_debt);
    println!("total_debt={}", b.total_debt);
    println!("credit={}", b.credit());
    println!("last_payment={}", opt_dt(&b.last_payment));
}

pub fn print_bank(b: &BankState) {
    println!("print_bank={}", b.print_bank);
    println!("lamination_bank={}", b.lamination_bank);
    println!("bank_last_updated={}", opt_dt(&b.last_updated));
}

pub fn opt_dt(dt: &Option<DateTime<Utc>>) -> String {
    dt.as_ref()
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "".to_string())
}

/// JSON dump used by `--json` outputs.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).context("serialize output failed")?;
    println!("{s}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parser_accepts_decimals_and_rejects_garbage() {
        assert_eq!(parse_amount("12.50").unwrap(), Cents::new(1250));
        assert_eq!(parse_amount("3").unwrap(), Cents::new(300));
        assert!(parse_amount("twelve").is_err());
    }

    #[test]
    fn kind_parser_is_case_insensitive() {
        assert_eq!(parse_kind("Print").unwrap(), ChargeKind::Print);
        assert_eq!(parse_kind("lamination").unwrap(), ChargeKind::Lamination);
        assert!(parse_kind("binding").is_err());
    }

    #[test]
    fn at_parser_accepts_dates() {
        let t = parse_at("2025-03-01").unwrap();
        assert_eq!(t.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert!(parse_at("soon").is_err());
    }

    #[test]
    fn opt_dt_renders_none_as_empty() {
        assert_eq!(opt_dt(&None), "");
    }
}
