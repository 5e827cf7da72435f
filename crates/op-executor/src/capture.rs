//! Diagnostic capture store.
//!
//! Screenshots taken before and after risky operations land here as
//! timestamped files under a per-session directory. Retention is
//! two-sided: a per-session file cap and a maximum age, both enforced
//! on every write so the store never needs a background sweeper.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, warn};

use forgehand_core_types::{CaptureRef, SessionId};

/// Retention knobs for the capture store.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub root: PathBuf,
    /// Oldest captures beyond this count are deleted, per session.
    pub per_session_cap: usize,
    /// Captures older than this are deleted regardless of count.
    pub max_age: Duration,
}

impl CaptureConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            per_session_cap: 50,
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Filesystem-backed capture store.
pub struct CaptureStore {
    config: CaptureConfig,
}

impl CaptureStore {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.config.root.join(&session.0)
    }

    /// Persist one capture and run retention for its session.
    pub fn store(
        &self,
        session: &SessionId,
        label: &str,
        bytes: &[u8],
    ) -> io::Result<CaptureRef> {
        let dir = self.session_dir(session);
        fs::create_dir_all(&dir)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let file_name = format!("{stamp}-{label}.png");
        let path = dir.join(&file_name);
        fs::write(&path, bytes)?;
        debug!(session = %session, file = %file_name, "capture stored");

        if let Err(err) = self.sweep_session(&dir) {
            // Retention failure never fails the capture itself.
            warn!(session = %session, error = %err, "capture retention sweep failed");
        }

        Ok(CaptureRef(format!("{}/{file_name}", session.0)))
    }

    /// Absolute path for a stored capture.
    pub fn path_of(&self, capture: &CaptureRef) -> PathBuf {
        self.config.root.join(&capture.0)
    }

    fn sweep_session(&self, dir: &Path) -> io::Result<()> {
        let now = SystemTime::now();
        let mut entries: Vec<(PathBuf, SystemTime)> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((e.path(), modified))
            })
            .collect();

        // Oldest first.
        entries.sort_by_key(|(_, modified)| *modified);

        let over_cap = entries.len().saturating_sub(self.config.per_session_cap);
        for (idx, (path, modified)) in entries.iter().enumerate() {
            let expired = now
                .duration_since(*modified)
                .map(|age| age > self.config.max_age)
                .unwrap_or(false);
            if idx < over_cap || expired {
                if let Err(err) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %err, "failed to delete capture");
                }
            }
        }
        Ok(())
    }
}
