//! Failure snapshots for replay in a later run
//!
//! At the end of a run the terminal failures are written twice:
//! - `failed_records-<timestamp>.json`: the replay file, read back by
//!   [`load`] to rebuild the units
//! - `failed_records-<timestamp>.txt`: one meeting id or URL per line, for
//!   people

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Payload, WorkUnit};

/// Snapshot format version written to the replay file
const SNAPSHOT_VERSION: u32 = 1;

/// Paths of a written snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotFiles {
    /// Machine-readable replay file
    pub replay: PathBuf,
    /// One line per failed unit
    pub list: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    created_at: DateTime<Utc>,
    units: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    description: String,
    attempts: u32,
    payload: Payload,
}

/// Write the failed units to `directory`
///
/// Returns `None` without touching the filesystem when nothing failed.
pub async fn write(directory: &Path, failed: &[WorkUnit]) -> Result<Option<SnapshotFiles>> {
    if failed.is_empty() {
        return Ok(None);
    }

    let created_at = Utc::now();
    let stem = format!("failed_records-{}", created_at.format("%Y-%m-%dT%H-%M-%S%.3f"));
    let files = SnapshotFiles {
        replay: directory.join(format!("{}.json", stem)),
        list: directory.join(format!("{}.txt", stem)),
    };

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        created_at,
        units: failed
            .iter()
            .map(|unit| SnapshotEntry {
                description: unit.description().to_string(),
                attempts: unit.attempts(),
                payload: unit.payload().clone(),
            })
            .collect(),
    };

    tokio::fs::create_dir_all(directory).await?;
    tokio::fs::write(&files.replay, serde_json::to_vec_pretty(&snapshot)?).await?;

    let mut list = String::new();
    for unit in failed {
        list.push_str(&list_line(unit));
        list.push('\n');
    }
    tokio::fs::write(&files.list, list).await?;

    tracing::info!(
        failed = failed.len(),
        replay = %files.replay.display(),
        "Wrote failure snapshot"
    );
    Ok(Some(files))
}

/// Rebuild units from a replay file, each starting again at attempt 1
///
/// # Errors
/// [`Error::Parse`] for a file written in another snapshot format version.
pub async fn load(path: &Path) -> Result<Vec<WorkUnit>> {
    let content = tokio::fs::read(path).await?;
    let snapshot: Snapshot = serde_json::from_slice(&content)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::Parse(format!(
            "unsupported snapshot version {} in {} (expected {})",
            snapshot.version,
            path.display(),
            SNAPSHOT_VERSION
        )));
    }

    tracing::info!(
        path = %path.display(),
        units = snapshot.units.len(),
        created_at = %snapshot.created_at,
        "Loaded failure snapshot"
    );

    Ok(snapshot
        .units
        .into_iter()
        .map(|entry| WorkUnit::new(entry.description, entry.payload))
        .collect())
}

fn list_line(unit: &WorkUnit) -> String {
    match unit.payload() {
        Payload::Record(task) => task.record.meeting_record.trim().to_string(),
        Payload::Fetch(task) => task.url.clone(),
    }
}
