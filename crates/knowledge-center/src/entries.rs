//! Knowledge index: accepted solutions, searchable by similarity.

use std::collections::BTreeSet;

use dashmap::DashMap;
use tracing::{debug, info};

use forgehand_core_types::{DevelopmentRequest, EntryId, KnowledgeEntry, SolutionId};

/// Scores how well a stored signature matches a query signature.
pub trait SimilarityProvider: Send + Sync {
    /// Similarity in `[0.0, 1.0]`.
    fn similarity(&self, query: &[String], signature: &[String]) -> f64;
}

/// Cosine similarity over token sets (all weights 1). Deterministic and
/// dependency-free; a vector-embedding provider can replace it at the
/// same seam.
pub struct TokenSimilarity;

impl SimilarityProvider for TokenSimilarity {
    fn similarity(&self, query: &[String], signature: &[String]) -> f64 {
        let a: BTreeSet<&str> = query.iter().map(String::as_str).collect();
        let b: BTreeSet<&str> = signature.iter().map(String::as_str).collect();
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared = a.intersection(&b).count() as f64;
        shared / ((a.len() as f64).sqrt() * (b.len() as f64).sqrt())
    }
}

/// Normalized token signature of a request: title, description and
/// requirements, lowercased, short tokens dropped, deduplicated.
pub fn signature_of(request: &DevelopmentRequest) -> Vec<String> {
    let mut tokens: BTreeSet<String> = BTreeSet::new();
    let mut absorb = |text: &str| {
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            tokens.insert(token.to_string());
        }
    };
    absorb(&request.title);
    absorb(&request.description);
    for requirement in &request.requirements {
        absorb(requirement);
    }
    tokens.into_iter().collect()
}

/// Concurrent knowledge index.
///
/// Writes happen only on acceptance; everything else is lookup.
#[derive(Default)]
pub struct KnowledgeStore {
    entries: DashMap<EntryId, KnowledgeEntry>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry, or refresh the existing one for the same
    /// solution (signature and score move, usage history is kept).
    pub fn upsert(&self, entry: KnowledgeEntry) -> EntryId {
        if let Some(mut existing) = self
            .entries
            .iter_mut()
            .find(|e| e.solution_id == entry.solution_id)
        {
            debug!(entry = %existing.id, "refreshing knowledge entry");
            existing.signature = entry.signature;
            existing.success_score = existing.success_score.max(entry.success_score);
            existing.solution_version = entry.solution_version;
            return existing.id.clone();
        }
        let id = entry.id.clone();
        info!(entry = %id, solution = %entry.solution_id, "knowledge entry created");
        self.entries.insert(id.clone(), entry);
        id
    }

    pub fn get(&self, id: &EntryId) -> Option<KnowledgeEntry> {
        self.entries.get(id).map(|e| e.clone())
    }

    pub fn for_solution(&self, solution: &SolutionId) -> Option<KnowledgeEntry> {
        self.entries
            .iter()
            .find(|e| e.solution_id == *solution)
            .map(|e| e.clone())
    }

    /// Record one reuse of an entry.
    pub fn record_usage(&self, id: &EntryId, success: bool) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.record_usage(success);
        }
    }

    /// All entries ranked by similarity to the query, best first.
    /// Entries below `floor` are dropped.
    pub fn search(
        &self,
        provider: &dyn SimilarityProvider,
        query: &[String],
        floor: f64,
    ) -> Vec<(KnowledgeEntry, f64)> {
        let mut ranked: Vec<(KnowledgeEntry, f64)> = self
            .entries
            .iter()
            .map(|e| {
                let score = provider.similarity(query, &e.signature);
                (e.clone(), score)
            })
            .filter(|(_, score)| *score >= floor)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Drop entries that have proven unreliable: enough recorded uses
    /// and a success score under the floor.
    pub fn sweep_unreliable(&self, min_uses: u32, score_floor: f64) -> usize {
        let doomed: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|e| e.usage_count >= min_uses && e.success_score < score_floor)
            .map(|e| e.id.clone())
            .collect();
        for id in &doomed {
            info!(entry = %id, "removing unreliable knowledge entry");
            self.entries.remove(id);
        }
        doomed.len()
    }

    /// Drop entries that have gone stale: no use (or creation) within
    /// `max_age` and too few recorded uses to keep on faith.
    pub fn sweep_stale(&self, max_age: std::time::Duration, max_uses: u32) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = chrono::Utc::now() - max_age;
        let doomed: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|e| {
                e.usage_count < max_uses && e.last_used_at.unwrap_or(e.created_at) < cutoff
            })
            .map(|e| e.id.clone())
            .collect();
        for id in &doomed {
            info!(entry = %id, "removing stale knowledge entry");
            self.entries.remove(id);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dump(&self) -> Vec<KnowledgeEntry> {
        self.entries.iter().map(|e| e.clone()).collect()
    }

    pub fn replace_all(&self, entries: Vec<KnowledgeEntry>) {
        self.entries.clear();
        for entry in entries {
            self.entries.insert(entry.id.clone(), entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgehand_core_types::{Priority, SolutionVersion};

    fn request(title: &str, description: &str) -> DevelopmentRequest {
        DevelopmentRequest::new(title, description, vec![], Priority::Medium)
    }

    fn entry(signature: &[&str], score: f64) -> KnowledgeEntry {
        KnowledgeEntry::new(
            forgehand_core_types::SolutionId::new(),
            SolutionVersion::first(),
            signature.iter().map(|s| s.to_string()).collect(),
            score,
        )
    }

    #[test]
    fn identical_signatures_score_one() {
        let provider = TokenSimilarity;
        let sig = vec!["login".to_string(), "form".to_string()];
        assert!((provider.similarity(&sig, &sig) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_signatures_score_zero() {
        let provider = TokenSimilarity;
        let a = vec!["login".to_string()];
        let b = vec!["report".to_string()];
        assert_eq!(provider.similarity(&a, &b), 0.0);
    }

    #[test]
    fn signature_drops_noise_tokens() {
        let req = request("Add a login form", "The form must post to the auth API");
        let sig = signature_of(&req);
        assert!(sig.contains(&"login".to_string()));
        assert!(sig.contains(&"auth".to_string()));
        // One- and two-letter tokens are dropped.
        assert!(!sig.contains(&"a".to_string()));
        assert!(!sig.contains(&"to".to_string()));
    }

    #[test]
    fn search_ranks_by_similarity() {
        let store = KnowledgeStore::new();
        store.upsert(entry(&["login", "form", "auth"], 0.9));
        store.upsert(entry(&["report", "export", "csv"], 0.9));

        let query = vec!["login".to_string(), "form".to_string()];
        let results = store.search(&TokenSimilarity, &query, 0.1);
        assert_eq!(results.len(), 1);
        assert!(results[0].0.signature.contains(&"login".to_string()));
    }

    #[test]
    fn upsert_refreshes_same_solution() {
        let store = KnowledgeStore::new();
        let first = entry(&["login"], 0.5);
        let solution_id = first.solution_id.clone();
        let id = store.upsert(first);

        let mut second = entry(&["login", "form"], 0.8);
        second.solution_id = solution_id;
        let same_id = store.upsert(second);

        assert_eq!(id, same_id);
        assert_eq!(store.len(), 1);
        let refreshed = store.get(&id).unwrap();
        assert!((refreshed.success_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn sweep_removes_only_proven_failures() {
        let store = KnowledgeStore::new();
        let mut unreliable = entry(&["flaky"], 0.9);
        for _ in 0..5 {
            unreliable.record_usage(false);
        }
        let fresh = entry(&["new"], 0.2);

        store.upsert(unreliable);
        store.upsert(fresh);

        let removed = store.sweep_unreliable(3, 0.4);
        assert_eq!(removed, 1);
        // The fresh low-score entry survives: not enough usage evidence.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stale_sweep_needs_both_age_and_low_usage() {
        let store = KnowledgeStore::new();
        let month = std::time::Duration::from_secs(30 * 24 * 60 * 60);

        let mut forgotten = entry(&["orphan"], 0.9);
        forgotten.created_at = chrono::Utc::now() - chrono::Duration::days(60);

        let mut veteran = entry(&["workhorse"], 0.9);
        veteran.created_at = chrono::Utc::now() - chrono::Duration::days(60);
        for _ in 0..8 {
            veteran.record_usage(true);
        }
        veteran.last_used_at = Some(chrono::Utc::now() - chrono::Duration::days(45));

        let recent = entry(&["new"], 0.9);

        store.upsert(forgotten);
        store.upsert(veteran);
        store.upsert(recent);

        // Old and unused goes; old-but-proven and recent both stay.
        assert_eq!(store.sweep_stale(month, 2), 1);
        assert_eq!(store.len(), 2);
        assert!(store.dump().iter().all(|e| !e.signature.contains(&"orphan".to_string())));
    }
}
