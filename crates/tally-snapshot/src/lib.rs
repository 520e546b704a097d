//! Flat-file snapshots of event history for offline reads.
//!
//! Layout: `<out_dir>/<collection>-all.json` or `<out_dir>/<collection>-uid-<uid>.json`,
//! each holding `{"lastUpdated": <epoch ms>, "items": [...]}` with items newest first.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tally_ledger::{ChargeKind, LedgerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    ChargesPrint,
    ChargesLamination,
    Payments,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::ChargesPrint,
        Collection::ChargesLamination,
        Collection::Payments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::ChargesPrint => "charges-print",
            Collection::ChargesLamination => "charges-lamination",
            Collection::Payments => "payments",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s.trim())
    }

    pub fn of(event: &LedgerEvent) -> Self {
        match event {
            LedgerEvent::Charge(c) => match c.kind {
                ChargeKind::Print => Collection::ChargesPrint,
                ChargeKind::Lamination => Collection::ChargesLamination,
            },
            LedgerEvent::Payment(_) => Collection::Payments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Epoch milliseconds.
    pub last_updated: i64,
    pub items: Vec<LedgerEvent>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            last_updated: 0,
            items: Vec::new(),
        }
    }
}

/// `<collection>-all.json` or `<collection>-uid-<uid>.json`.
pub fn snapshot_file_name(collection: Collection, uid: Option<&str>) -> Result<String> {
    match uid {
        None => Ok(format!("{}-all.json", collection.as_str())),
        Some(uid) => {
            if uid.is_empty() || uid.contains(['/', '\\']) || uid == "." || uid == ".." {
                bail!("uid '{uid}' cannot be used in a snapshot file name");
            }
            Ok(format!("{}-uid-{}.json", collection.as_str(), uid))
        }
    }
}

fn sort_newest_first(items: &mut [LedgerEvent]) {
    items.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| b.id().cmp(a.id()))
    });
}

fn max_millis<'a>(items: impl IntoIterator<Item = &'a LedgerEvent>) -> Option<i64> {
    items.into_iter().map(|e| e.timestamp().timestamp_millis()).max()
}

/// Events of `collection` (optionally only `uid`'s), newest first.
/// `lastUpdated` is the newest item's timestamp, or `now` when there are none.
pub fn build_snapshot(
    collection: Collection,
    events: &[LedgerEvent],
    uid: Option<&str>,
    now: DateTime<Utc>,
) -> Snapshot {
    let mut items: Vec<LedgerEvent> = events
        .iter()
        .filter(|e| Collection::of(e) == collection)
        .filter(|e| uid.map_or(true, |u| e.uid() == u))
        .cloned()
        .collect();
    sort_newest_first(&mut items);
    let last_updated = max_millis(&items).unwrap_or_else(|| now.timestamp_millis());
    Snapshot { last_updated, items }
}

/// Merge `delta` into `existing` by event id: known ids are replaced in place,
/// new ids appended. `lastUpdated` only moves forward.
pub fn merge_delta(existing: Snapshot, delta: &[LedgerEvent], now: DateTime<Utc>) -> Snapshot {
    let mut items = existing.items;
    let mut index: HashMap<String, usize> = items
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id().to_string(), i))
        .collect();

    for ev in delta {
        match index.get(ev.id()) {
            Some(&pos) => items[pos] = ev.clone(),
            None => {
                index.insert(ev.id().to_string(), items.len());
                items.push(ev.clone());
            }
        }
    }

    let newest = max_millis(delta).unwrap_or(0).max(existing.last_updated);
    let last_updated = if newest > 0 { newest } else { now.timestamp_millis() };
    Snapshot { last_updated, items }
}

/// Read a snapshot file; a missing file reads as empty.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::empty());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read snapshot failed: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse snapshot failed: {}", path.display()))
}

pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string(snapshot).context("serialize snapshot failed")?;
    fs::write(path, json).with_context(|| format!("write snapshot failed: {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub collection: Collection,
    pub path: PathBuf,
    pub items: usize,
}

/// Write one snapshot file per collection into `out_dir` (created if missing).
pub fn export_snapshots(
    out_dir: &Path,
    events: &[LedgerEvent],
    uid: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<ExportedFile>> {
    fs::create_dir_all(out_dir).with_context(|| format!("create snapshot dir failed: {}", out_dir.display()))?;

    let mut out = Vec::with_capacity(Collection::ALL.len());
    for collection in Collection::ALL {
        let snapshot = build_snapshot(collection, events, uid, now);
        let path = out_dir.join(snapshot_file_name(collection, uid)?);
        write_snapshot(&path, &snapshot)?;
        out.push(ExportedFile {
            collection,
            path,
            items: snapshot.items.len(),
        });
    }
    Ok(out)
}

/// Read-merge-write a delta into an existing snapshot file.
pub fn apply_delta_to_file(path: &Path, delta: &[LedgerEvent], now: DateTime<Utc>) -> Result<Snapshot> {
    let merged = merge_delta(read_snapshot(path)?, delta, now);
    write_snapshot(path, &merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(
            snapshot_file_name(Collection::Payments, None).unwrap(),
            "payments-all.json"
        );
        assert_eq!(
            snapshot_file_name(Collection::ChargesPrint, Some("u42")).unwrap(),
            "charges-print-uid-u42.json"
        );
        assert!(snapshot_file_name(Collection::Payments, Some("../etc")).is_err());
    }

    #[test]
    fn collection_parse_round_trips_names() {
        for c in Collection::ALL {
            assert_eq!(Collection::parse(c.as_str()), Some(c));
        }
        assert_eq!(Collection::parse("income"), None);
    }
}
