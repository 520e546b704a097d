//! Flat-file snapshot export of the event history.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tally_engine::Engine;
use tally_snapshot::{apply_delta_to_file, export_snapshots, snapshot_file_name, Collection};

async fn load_history(engine: &Engine, uid: Option<&str>) -> Result<Vec<tally_ledger::LedgerEvent>> {
    let store = engine.store();
    let events = match uid {
        Some(uid) => store.load_events(uid).await?,
        None => store.load_all_events().await?,
    };
    Ok(events)
}

/// Full export: one file per collection, overwriting what is there.
pub async fn export(engine: &Engine, out_dir: &Path, uid: Option<&str>) -> Result<()> {
    let events = load_history(engine, uid).await?;
    let files = export_snapshots(out_dir, &events, uid, Utc::now())?;
    for f in &files {
        println!(
            "snapshot_written=true collection={} items={} path={}",
            f.collection.as_str(),
            f.items,
            f.path.display()
        );
    }
    Ok(())
}

/// Merge events at or after `since` into the existing files.
pub async fn refresh(engine: &Engine, out_dir: &Path, uid: Option<&str>, since: DateTime<Utc>) -> Result<()> {
    let events = load_history(engine, uid).await?;
    let now = Utc::now();
    for collection in Collection::ALL {
        let delta: Vec<_> = events
            .iter()
            .filter(|e| Collection::of(e) == collection && e.timestamp() >= since)
            .cloned()
            .collect();
        let path = out_dir.join(snapshot_file_name(collection, uid)?);
        let merged = apply_delta_to_file(&path, &delta, now)?;
        println!(
            "snapshot_merged=true collection={} delta={} items={} path={}",
            collection.as_str(),
            delta.len(),
            merged.items.len(),
            path.display()
        );
    }
    Ok(())
}
