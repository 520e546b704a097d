use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tally_ledger::{Cents, ChargeKind};

mod commands;

use commands::{ledger, snapshot};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Print/lamination debt ledger CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Record a print or lamination charge
    Charge {
        #[arg(long)]
        uid: String,

        /// print | lamination
        #[arg(long, value_parser = commands::parse_kind)]
        kind: ChargeKind,

        /// Decimal amount, e.g. 12.50
        #[arg(long, value_parser = commands::parse_amount)]
        amount: Cents,

        /// Event time (RFC 3339 or YYYY-MM-DD); defaults to now
        #[arg(long, value_parser = commands::parse_at)]
        at: Option<DateTime<Utc>>,

        /// Explicit event id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Record a payment
    Pay {
        #[arg(long)]
        uid: String,

        /// Decimal amount, e.g. 20
        #[arg(long, value_parser = commands::parse_amount)]
        amount: Cents,

        /// Event time (RFC 3339 or YYYY-MM-DD); defaults to now
        #[arg(long, value_parser = commands::parse_at)]
        at: Option<DateTime<Utc>>,

        /// Payer display name, used in the event id
        #[arg(long)]
        payer: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Rebuild balances from full event history
    Reconcile {
        /// Single user
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        uid: Option<String>,

        /// Every user with a balance or an event
        #[arg(long, default_value_t = false)]
        all: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print a user's stored balance
    Balance {
        #[arg(long)]
        uid: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print bank totals
    Bank {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Flat-file event snapshots
    Snapshot {
        #[command(subcommand)]
        cmd: SnapshotCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum SnapshotCmd {
    /// Write one file per collection from the full history.
    Export {
        /// Defaults to snapshot.out_dir from config
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Restrict to one user
        #[arg(long)]
        uid: Option<String>,
    },

    /// Merge events at or after --since into existing snapshot files.
    Refresh {
        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[arg(long)]
        uid: Option<String>,

        #[arg(long, value_parser = commands::parse_at)]
        since: DateTime<Utc>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tally_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = tally_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_ledger_tables={} event_count={}",
                        s.ok, s.has_ledger_tables, s.event_count
                    );
                }
                DbCmd::Migrate => {
                    tally_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = tally_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Charge {
            uid,
            kind,
            amount,
            at,
            id,
            note,
        } => {
            let settings = commands::load_settings()?;
            let engine = commands::open_engine(&settings).await?;
            ledger::charge(
                &engine,
                ledger::ChargeArgs {
                    uid,
                    kind,
                    amount,
                    at,
                    id,
                    note,
                },
            )
            .await?;
        }

        Commands::Pay {
            uid,
            amount,
            at,
            payer,
            note,
        } => {
            let settings = commands::load_settings()?;
            let engine = commands::open_engine(&settings).await?;
            ledger::pay(
                &engine,
                ledger::PayArgs {
                    uid,
                    amount,
                    at,
                    payer,
                    note,
                },
                settings.engine.reconcile_after_payment,
            )
            .await?;
        }

        Commands::Reconcile { uid, all, json } => {
            let settings = commands::load_settings()?;
            let engine = commands::open_engine(&settings).await?;
            match uid {
                Some(uid) if !all => ledger::reconcile_user(&engine, &uid, json).await?,
                _ => ledger::reconcile_all(&engine, json).await?,
            }
        }

        Commands::Balance { uid, json } => {
            let settings = commands::load_settings()?;
            let engine = commands::open_engine(&settings).await?;
            ledger::balance(&engine, &uid, json).await?;
        }

        Commands::Bank { json } => {
            let settings = commands::load_settings()?;
            let engine = commands::open_engine(&settings).await?;
            ledger::bank(&engine, json).await?;
        }

        Commands::Snapshot { cmd } => {
            let settings = commands::load_settings()?;
            let engine = commands::open_engine(&settings).await?;
            match cmd {
                SnapshotCmd::Export { out_dir, uid } => {
                    let out_dir = out_dir.unwrap_or_else(|| PathBuf::from(&settings.snapshot.out_dir));
                    snapshot::export(&engine, &out_dir, uid.as_deref()).await?;
                }
                SnapshotCmd::Refresh { out_dir, uid, since } => {
                    let out_dir = out_dir.unwrap_or_else(|| PathBuf::from(&settings.snapshot.out_dir));
                    snapshot::refresh(&engine, &out_dir, uid.as_deref(), since).await?;
                }
            }
        }
    }

    Ok(())
}
