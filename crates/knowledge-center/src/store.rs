//! Versioned solution store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use forgehand_core_types::{
    ImplementationSolution, SolutionId, SolutionStatus, SolutionVersion,
};

/// In-memory store of solution versions. Versions are immutable once
/// inserted; updates always append a new version.
pub struct SolutionStore {
    inner: Arc<RwLock<HashMap<SolutionId, BTreeMap<u32, ImplementationSolution>>>>,
    /// Oldest versions beyond this count are pruned per solution.
    max_versions: usize,
}

impl SolutionStore {
    pub fn new(max_versions: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            max_versions: max_versions.max(1),
        }
    }

    pub fn insert(&self, solution: ImplementationSolution) {
        let mut guard = self.inner.write();
        let versions = guard.entry(solution.id.clone()).or_default();
        versions.insert(solution.version.0, solution);
        while versions.len() > self.max_versions {
            if let Some((&oldest, _)) = versions.iter().next() {
                debug!(version = oldest, "pruning solution version");
                versions.remove(&oldest);
            }
        }
    }

    pub fn latest(&self, id: &SolutionId) -> Option<ImplementationSolution> {
        self.inner
            .read()
            .get(id)
            .and_then(|versions| versions.values().next_back().cloned())
    }

    pub fn version(&self, id: &SolutionId, version: SolutionVersion) -> Option<ImplementationSolution> {
        self.inner
            .read()
            .get(id)
            .and_then(|versions| versions.get(&version.0).cloned())
    }

    pub fn next_version(&self, id: &SolutionId) -> SolutionVersion {
        self.inner
            .read()
            .get(id)
            .and_then(|versions| versions.keys().next_back().map(|v| SolutionVersion(v + 1)))
            .unwrap_or_else(SolutionVersion::first)
    }

    /// The newest version, strictly before `before`, that passed
    /// validation or was accepted. Rollback target.
    pub fn previous_good(
        &self,
        id: &SolutionId,
        before: SolutionVersion,
    ) -> Option<ImplementationSolution> {
        self.inner.read().get(id).and_then(|versions| {
            versions
                .range(..before.0)
                .rev()
                .find(|(_, s)| {
                    matches!(
                        s.status,
                        SolutionStatus::Validated | SolutionStatus::Accepted
                    )
                })
                .map(|(_, s)| s.clone())
        })
    }

    /// Flip the status of one stored version. Operations and scores are
    /// untouched; status is the only field that moves without a new
    /// version. Returns false when the version does not exist.
    pub fn update_status(
        &self,
        id: &SolutionId,
        version: SolutionVersion,
        status: SolutionStatus,
    ) -> bool {
        let mut guard = self.inner.write();
        match guard.get_mut(id).and_then(|v| v.get_mut(&version.0)) {
            Some(solution) => {
                solution.status = status;
                solution.updated_at = chrono::Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn all_versions(&self, id: &SolutionId) -> Vec<ImplementationSolution> {
        self.inner
            .read()
            .get(id)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_latest(&self) -> Vec<ImplementationSolution> {
        self.inner
            .read()
            .values()
            .filter_map(|versions| versions.values().next_back().cloned())
            .collect()
    }

    pub fn dump(&self) -> Vec<ImplementationSolution> {
        self.inner
            .read()
            .values()
            .flat_map(|versions| versions.values().cloned())
            .collect()
    }

    pub fn replace_all(&self, solutions: Vec<ImplementationSolution>) {
        let mut guard = self.inner.write();
        guard.clear();
        for solution in solutions {
            guard
                .entry(solution.id.clone())
                .or_default()
                .insert(solution.version.0, solution);
        }
    }
}

impl Default for SolutionStore {
    fn default() -> Self {
        Self::new(20)
    }
}
