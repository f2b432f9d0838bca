use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::Test;
use crate::error::Result;

pub const SNAPSHOT_FILE: &str = "experiments.json";

/// Point-in-time copy of the registry and the sticky assignment table.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tests: Vec<Test>,
    /// user id → (test id → variant id).
    #[serde(default)]
    pub assignments: HashMap<String, HashMap<String, String>>,
}

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Writes `snapshot` to `dir/experiments.json` through a temp file and
/// rename, so readers never observe a partial file.
pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
    let final_path = snapshot_path(dir);
    let data = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, &final_path)?;
    tracing::info!(
        path = %final_path.display(),
        tests = snapshot.tests.len(),
        users = snapshot.assignments.len(),
        "wrote experiment snapshot"
    );
    Ok(())
}

/// `Ok(None)` when no snapshot has been written to `dir` yet.
pub fn read_snapshot(dir: &Path) -> Result<Option<Snapshot>> {
    let path = snapshot_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)?;
    let snapshot: Snapshot = serde_json::from_str(&data)?;
    Ok(Some(snapshot))
}
