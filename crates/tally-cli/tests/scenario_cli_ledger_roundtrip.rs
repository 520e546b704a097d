use assert_cmd::prelude::*;
use predicates::prelude::*;
use uuid::Uuid;

/// `tally charge` / `tally pay` / `tally balance` / `tally reconcile` against a
/// real database.
///
/// DB-backed; skipped if TALLY_DATABASE_URL is not set.
#[tokio::test]
async fn cli_charge_pay_balance_reconcile_roundtrip() -> anyhow::Result<()> {
    let url = match std::env::var(tally_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: TALLY_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = tally_db::connect(&url, 2).await?;
    tally_db::migrate(&pool).await?;

    let uid = format!("cli-{}", Uuid::new_v4().simple());
    let dir = tempfile::tempdir()?;
    let run = |args: &[&str]| {
        let mut cmd = std::process::Command::cargo_bin("tally").expect("tally binary");
        cmd.current_dir(dir.path())
            .env(tally_db::ENV_DB_URL, &url)
            .env_remove("TALLY_CONFIG")
            .args(args);
        cmd
    };

    run(&[
        "charge", "--uid", &uid, "--kind", "lamination", "--amount", "5", "--at", "2025-03-01",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("lamination_debt=5.00"));

    run(&["pay", "--uid", &uid, "--amount", "8", "--at", "2025-03-02", "--payer", "Maria K"])
        .assert()
        .success()
        .stdout(predicate::str::contains("event_id=maria-k-02-03-2025-8.00-"))
        .stdout(predicate::str::contains("total_debt=-3.00"))
        .stdout(predicate::str::contains("reconciled=true drift_fields=0"));

    run(&["balance", "--uid", &uid])
        .assert()
        .success()
        .stdout(predicate::str::contains("credit=3.00"));

    run(&["reconcile", "--uid", &uid])
        .assert()
        .success()
        .stdout(predicate::str::contains("events_replayed=2 clean=true"));

    let out_dir = dir.path().join("snap");
    run(&["snapshot", "export", "--uid", &uid, "--out-dir"])
        .arg(&out_dir)
        .assert()
        .success();
    assert!(out_dir
        .join(format!("payments-uid-{uid}.json"))
        .exists());

    Ok(())
}
