//! JSON snapshot persistence for the solution and knowledge stores.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use forgehand_core_types::{ImplementationSolution, KnowledgeEntry};

use crate::entries::KnowledgeStore;
use crate::store::SolutionStore;

/// Everything the center owns, in one serializable blob.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub solutions: Vec<ImplementationSolution>,
    pub entries: Vec<KnowledgeEntry>,
    pub saved_at: DateTime<Utc>,
}

/// Write both stores to `path` atomically (write-then-rename).
pub fn save_snapshot(
    path: &Path,
    solutions: &SolutionStore,
    knowledge: &KnowledgeStore,
) -> io::Result<()> {
    let snapshot = Snapshot {
        solutions: solutions.dump(),
        entries: knowledge.dump(),
        saved_at: Utc::now(),
    };
    let json = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    info!(
        path = %path.display(),
        solutions = snapshot.solutions.len(),
        entries = snapshot.entries.len(),
        "knowledge snapshot saved"
    );
    Ok(())
}

/// Load a snapshot into both stores. `Ok(false)` when no snapshot
/// exists yet; the stores are left untouched.
pub fn load_snapshot(
    path: &Path,
    solutions: &SolutionStore,
    knowledge: &KnowledgeStore,
) -> io::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    solutions.replace_all(snapshot.solutions);
    knowledge.replace_all(snapshot.entries);
    info!(path = %path.display(), "knowledge snapshot loaded");
    Ok(true)
}
