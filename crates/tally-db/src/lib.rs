//! tally-db
//!
//! Postgres persistence for the ledger: embedded migrations, history reads,
//! balance/bank reads and the single-transaction event commit. The
//! [`PgLedgerStore`] adapter exposes these as a `tally_engine::LedgerStore`.

mod store;

pub use store::PgLedgerStore;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tally_engine::{CommitReceipt, EventCommit, StoreError, VersionedBalance};
use tally_ledger::{
    BankDelta, BankState, Cents, ChargeEvent, ChargeKind, LedgerEvent, PaymentEvent, UserBalance,
    ValidationError,
};
use tracing::debug;

pub const ENV_DB_URL: &str = "TALLY_DATABASE_URL";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connect to Postgres using TALLY_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    connect_from_env_with(DEFAULT_MAX_CONNECTIONS).await
}

pub async fn connect_from_env_with(max_connections: u32) -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, max_connections).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_ledger_tables: bool,
    pub event_count: i64,
}

/// Connectivity + schema presence + history size.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (n_tables,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from information_schema.tables
        where table_schema = 'public'
          and table_name in ('ledger_events', 'user_balances', 'bank_state')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;
    let has_ledger_tables = n_tables == 3;

    let event_count = if has_ledger_tables {
        let (n,): (i64,) = sqlx::query_as::<_, (i64,)>("select count(*)::bigint from ledger_events")
            .fetch_one(pool)
            .await
            .context("status event count failed")?;
        n
    } else {
        0
    };

    Ok(DbStatus {
        ok: one == 1,
        has_ledger_tables,
        event_count,
    })
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn decode_balance(row: &PgRow) -> Result<VersionedBalance> {
    let balance = UserBalance {
        uid: row.try_get("uid")?,
        print_debt: Cents::new(row.try_get("print_debt_cents")?),
        lamination_debt: Cents::new(row.try_get("lamination_debt_cents")?),
        total_debt: Cents::new(row.try_get("total_debt_cents")?),
        last_payment: row.try_get("last_payment")?,
    };
    Ok(VersionedBalance {
        balance,
        version: row.try_get("version")?,
    })
}

fn decode_bank(row: &PgRow) -> Result<BankState> {
    Ok(BankState {
        print_bank: Cents::new(row.try_get("print_bank_cents")?),
        lamination_bank: Cents::new(row.try_get("lamination_bank_cents")?),
        last_updated: row.try_get("last_updated")?,
    })
}

fn decode_event(row: &PgRow) -> Result<LedgerEvent> {
    let id: String = row.try_get("event_id")?;
    let uid: String = row.try_get("uid")?;
    let kind: String = row.try_get("kind")?;
    let amount = Cents::new(row.try_get("amount_cents")?);
    let timestamp: DateTime<Utc> = row.try_get("ts")?;
    let payer: Option<String> = row.try_get("payer")?;
    let note: Option<String> = row.try_get("note")?;

    if kind == "payment" {
        return Ok(LedgerEvent::Payment(PaymentEvent {
            id,
            uid,
            amount,
            timestamp,
            payer,
            note,
        }));
    }
    let kind = ChargeKind::parse(&kind)
        .ok_or_else(|| anyhow!("ledger_events.kind has unknown value '{kind}' (event {id})"))?;
    Ok(LedgerEvent::Charge(ChargeEvent {
        id,
        uid,
        kind,
        amount,
        timestamp,
        note,
    }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

const BALANCE_COLS: &str =
    "uid, print_debt_cents, lamination_debt_cents, total_debt_cents, last_payment, version";
const EVENT_COLS: &str = "event_id, uid, kind, amount_cents, ts, payer, note";

pub async fn fetch_balance(pool: &PgPool, uid: &str) -> Result<VersionedBalance> {
    let row = sqlx::query(&format!("select {BALANCE_COLS} from user_balances where uid = $1"))
        .bind(uid)
        .fetch_optional(pool)
        .await
        .context("fetch_balance failed")?;
    match row {
        Some(row) => decode_balance(&row),
        None => Ok(VersionedBalance::absent(uid)),
    }
}

pub async fn fetch_bank(pool: &PgPool) -> Result<BankState> {
    let row = sqlx::query(
        "select print_bank_cents, lamination_bank_cents, last_updated from bank_state where id = 'main'",
    )
    .fetch_optional(pool)
    .await
    .context("fetch_bank failed")?;
    match row {
        Some(row) => decode_bank(&row),
        None => Ok(BankState::default()),
    }
}

pub async fn fetch_events_for_uid(pool: &PgPool, uid: &str) -> Result<Vec<LedgerEvent>> {
    let rows = sqlx::query(&format!("select {EVENT_COLS} from ledger_events where uid = $1"))
        .bind(uid)
        .fetch_all(pool)
        .await
        .context("fetch_events_for_uid failed")?;
    rows.iter().map(decode_event).collect()
}

pub async fn fetch_all_events(pool: &PgPool) -> Result<Vec<LedgerEvent>> {
    let rows = sqlx::query(&format!("select {EVENT_COLS} from ledger_events"))
        .fetch_all(pool)
        .await
        .context("fetch_all_events failed")?;
    rows.iter().map(decode_event).collect()
}

/// Every uid with a balance row or an event, ascending.
pub async fn list_uids(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as::<_, (String,)>(
        r#"
        select uid from user_balances
        union
        select distinct uid from ledger_events
        order by 1
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_uids failed")?;
    Ok(rows.into_iter().map(|(u,)| u).collect())
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Last-writer-wins overwrite used by the Full Reconciler. Returns the new version.
pub async fn overwrite_balance(pool: &PgPool, balance: &UserBalance) -> Result<i64> {
    let (version,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into user_balances (
          uid, print_debt_cents, lamination_debt_cents, total_debt_cents, last_payment, version, updated_at
        ) values ($1, $2, $3, $4, $5, 1, now())
        on conflict (uid) do update set
          print_debt_cents      = excluded.print_debt_cents,
          lamination_debt_cents = excluded.lamination_debt_cents,
          total_debt_cents      = excluded.total_debt_cents,
          last_payment          = excluded.last_payment,
          version               = user_balances.version + 1,
          updated_at            = now()
        returning version
        "#,
    )
    .bind(&balance.uid)
    .bind(balance.print_debt.raw())
    .bind(balance.lamination_debt.raw())
    .bind(balance.total_debt.raw())
    .bind(balance.last_payment)
    .fetch_one(pool)
    .await
    .context("overwrite_balance failed")?;
    Ok(version)
}

fn event_kind(ev: &LedgerEvent) -> &'static str {
    match ev {
        LedgerEvent::Charge(c) => c.kind.as_str(),
        LedgerEvent::Payment(_) => "payment",
    }
}

/// SQLSTATE 40001 (serialization_failure) and 40P01 (deadlock_detected).
fn is_retryable_db_error(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    } else {
        false
    }
}

/// SQLSTATE 22003: a bigint column (bank or balance totals) would overflow.
fn is_out_of_range_error(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        db_err.code().as_deref() == Some("22003")
    } else {
        false
    }
}

fn classify(err: sqlx::Error, uid: &str, what: &'static str) -> StoreError {
    if is_retryable_db_error(&err) {
        StoreError::Conflict {
            uid: uid.to_string(),
        }
    } else if is_out_of_range_error(&err) {
        StoreError::Invalid(ValidationError::TotalOverflow)
    } else {
        StoreError::Backend(anyhow::Error::new(err).context(what))
    }
}

/// Write the balance under the version check. `Ok(false)` = version moved.
async fn write_balance_checked(
    tx: &mut Transaction<'_, Postgres>,
    balance: &UserBalance,
    expected_version: i64,
) -> Result<bool, sqlx::Error> {
    let res = if expected_version == 0 {
        sqlx::query(
            r#"
            insert into user_balances (
              uid, print_debt_cents, lamination_debt_cents, total_debt_cents, last_payment, version, updated_at
            ) values ($1, $2, $3, $4, $5, 1, now())
            on conflict (uid) do nothing
            "#,
        )
        .bind(&balance.uid)
        .bind(balance.print_debt.raw())
        .bind(balance.lamination_debt.raw())
        .bind(balance.total_debt.raw())
        .bind(balance.last_payment)
        .execute(&mut **tx)
        .await?
    } else {
        sqlx::query(
            r#"
            update user_balances set
              print_debt_cents      = $2,
              lamination_debt_cents = $3,
              total_debt_cents      = $4,
              last_payment          = $5,
              version               = version + 1,
              updated_at            = now()
            where uid = $1 and version = $6
            "#,
        )
        .bind(&balance.uid)
        .bind(balance.print_debt.raw())
        .bind(balance.lamination_debt.raw())
        .bind(balance.total_debt.raw())
        .bind(balance.last_payment)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?
    };
    Ok(res.rows_affected() == 1)
}

async fn insert_event(tx: &mut Transaction<'_, Postgres>, ev: &LedgerEvent) -> Result<bool, sqlx::Error> {
    let (payer, note) = match ev {
        LedgerEvent::Charge(c) => (None, c.note.as_deref()),
        LedgerEvent::Payment(p) => (p.payer.as_deref(), p.note.as_deref()),
    };
    let res = sqlx::query(
        r#"
        insert into ledger_events (event_id, uid, kind, amount_cents, ts, payer, note)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (event_id) do nothing
        "#,
    )
    .bind(ev.id())
    .bind(ev.uid())
    .bind(event_kind(ev))
    .bind(ev.amount().raw())
    .bind(ev.timestamp())
    .bind(payer)
    .bind(note)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected() == 1)
}

async fn bump_bank(
    tx: &mut Transaction<'_, Postgres>,
    delta: BankDelta,
    at: DateTime<Utc>,
) -> Result<Option<PgRow>, sqlx::Error> {
    if delta.is_zero() {
        return sqlx::query(
            "select print_bank_cents, lamination_bank_cents, last_updated from bank_state where id = 'main'",
        )
        .fetch_optional(&mut **tx)
        .await;
    }
    sqlx::query(
        r#"
        update bank_state set
          print_bank_cents      = print_bank_cents + $1,
          lamination_bank_cents = lamination_bank_cents + $2,
          last_updated          = $3
        where id = 'main'
        returning print_bank_cents, lamination_bank_cents, last_updated
        "#,
    )
    .bind(delta.print_bank.raw())
    .bind(delta.lamination_bank.raw())
    .bind(at)
    .fetch_optional(&mut **tx)
    .await
}

/// One incremental update in one transaction: balance (version-checked),
/// event row, bank increment. Any failure rolls all three back.
pub async fn commit_event(pool: &PgPool, commit: &EventCommit) -> Result<CommitReceipt, StoreError> {
    let uid = commit.event.uid();
    let mut tx = pool.begin().await.map_err(|e| classify(e, uid, "begin failed"))?;

    let wrote = write_balance_checked(&mut tx, &commit.balance, commit.expected_version)
        .await
        .map_err(|e| classify(e, uid, "balance write failed"))?;
    if !wrote {
        debug!(uid = %uid, expected_version = commit.expected_version, "balance version moved");
        return Err(StoreError::Conflict {
            uid: uid.to_string(),
        });
    }

    let inserted = insert_event(&mut tx, &commit.event)
        .await
        .map_err(|e| classify(e, uid, "event insert failed"))?;
    if !inserted {
        return Err(StoreError::DuplicateEvent {
            id: commit.event.id().to_string(),
        });
    }

    let bank_row = bump_bank(&mut tx, commit.bank_delta, commit.committed_at)
        .await
        .map_err(|e| classify(e, uid, "bank update failed"))?
        .ok_or_else(|| {
            StoreError::Backend(anyhow!("bank_state row 'main' missing; run `tally db migrate`"))
        })?;
    let bank = decode_bank(&bank_row)?;

    tx.commit().await.map_err(|e| classify(e, uid, "commit failed"))?;

    Ok(CommitReceipt {
        version: commit.expected_version + 1,
        bank,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_column_values() {
        let ev = LedgerEvent::Payment(PaymentEvent {
            id: "p".into(),
            uid: "u".into(),
            amount: Cents::new(1),
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            payer: None,
            note: None,
        });
        assert_eq!(event_kind(&ev), "payment");
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(!is_retryable_db_error(&sqlx::Error::RowNotFound));
        assert!(!is_out_of_range_error(&sqlx::Error::RowNotFound));
        let err = classify(sqlx::Error::PoolTimedOut, "u1", "begin failed");
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
