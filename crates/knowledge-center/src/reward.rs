//! The reward engine: decisions, version transitions, rollback.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use forgehand_core_types::{
    EntryId, KnowledgeEntry, RewardDecision, SolutionId, SolutionStatus, SolutionVersion,
    ValidationResult,
};

use crate::entries::KnowledgeStore;
use crate::store::SolutionStore;

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("unknown solution: {0}")]
    UnknownSolution(SolutionId),

    #[error("validation result is for solution {got}, not {want}")]
    SolutionMismatch { want: SolutionId, got: SolutionId },

    #[error("validation ran against version {validated}, latest is {latest}")]
    StaleValidation { validated: u32, latest: u32 },

    #[error("invalid reward thresholds: {0}")]
    BadConfig(String),
}

/// Decision thresholds and the rollback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Scores at or above this qualify for acceptance.
    pub accept_threshold: f64,
    /// Scores below this are rejected outright.
    pub reject_threshold: f64,
    /// Scores at or above this are accepted without review.
    pub auto_accept_threshold: f64,
    /// A rejection within this window of the last update also rolls the
    /// solution back to its previous good version.
    #[serde(with = "duration_secs")]
    pub rollback_window: Duration,
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.num_seconds().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(d)?))
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.7,
            reject_threshold: 0.4,
            auto_accept_threshold: 0.9,
            rollback_window: Duration::hours(24),
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), RewardError> {
        let ordered = 0.0 <= self.reject_threshold
            && self.reject_threshold <= self.accept_threshold
            && self.accept_threshold <= self.auto_accept_threshold
            && self.auto_accept_threshold <= 1.0;
        if !ordered {
            return Err(RewardError::BadConfig(format!(
                "expected 0 <= reject ({}) <= accept ({}) <= auto-accept ({}) <= 1",
                self.reject_threshold, self.accept_threshold, self.auto_accept_threshold
            )));
        }
        Ok(())
    }
}

/// What one reward application did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardOutcome {
    pub solution_id: SolutionId,
    pub decision: RewardDecision,
    pub score: f64,
    /// Version written by this decision, if any.
    pub new_version: Option<SolutionVersion>,
    /// Version restored by rollback, if one happened.
    pub rolled_back_to: Option<SolutionVersion>,
    /// Knowledge entry created or refreshed on acceptance.
    pub entry: Option<EntryId>,
}

/// Applies reward decisions to solutions and, on acceptance only, to
/// the knowledge index. Concurrent decisions on the same solution are
/// serialized per solution id.
pub struct RewardEngine {
    solutions: Arc<SolutionStore>,
    knowledge: Arc<KnowledgeStore>,
    config: RewardConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RewardEngine {
    pub fn new(
        solutions: Arc<SolutionStore>,
        knowledge: Arc<KnowledgeStore>,
        config: RewardConfig,
    ) -> Result<Self, RewardError> {
        config.validate()?;
        Ok(Self {
            solutions,
            knowledge,
            config,
            locks: DashMap::new(),
        })
    }

    fn lock_for(&self, id: &SolutionId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.0.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn auto_decision(&self, score: f64) -> RewardDecision {
        if score >= self.config.auto_accept_threshold {
            RewardDecision::Accepted
        } else if score < self.config.reject_threshold {
            RewardDecision::Rejected
        } else {
            RewardDecision::Pending
        }
    }

    /// Apply one decision. An explicit reviewer decision wins; with
    /// `None` the thresholds decide.
    pub async fn apply(
        &self,
        solution_id: &SolutionId,
        explicit: Option<RewardDecision>,
        validation: &ValidationResult,
        signature: Vec<String>,
    ) -> Result<RewardOutcome, RewardError> {
        if validation.solution_id != *solution_id {
            return Err(RewardError::SolutionMismatch {
                want: solution_id.clone(),
                got: validation.solution_id.clone(),
            });
        }

        let lock = self.lock_for(solution_id);
        let _guard = lock.lock().await;

        let latest = self
            .solutions
            .latest(solution_id)
            .ok_or_else(|| RewardError::UnknownSolution(solution_id.clone()))?;
        if validation.solution_version != latest.version {
            return Err(RewardError::StaleValidation {
                validated: validation.solution_version.0,
                latest: latest.version.0,
            });
        }

        let score = validation.aggregate_score;
        let decision = explicit.unwrap_or_else(|| self.auto_decision(score));
        info!(
            solution = %solution_id,
            decision = decision.name(),
            score,
            explicit = explicit.is_some(),
            "applying reward decision"
        );

        match decision {
            RewardDecision::Pending => Ok(RewardOutcome {
                solution_id: solution_id.clone(),
                decision,
                score,
                new_version: None,
                rolled_back_to: None,
                entry: None,
            }),
            RewardDecision::Accepted => {
                // Acceptance never lowers an earned score.
                let new_score = latest.success_score.max(score);
                let version = self.solutions.next_version(solution_id);
                let accepted = forgehand_core_types::ImplementationSolution {
                    version,
                    status: SolutionStatus::Accepted,
                    success_score: new_score,
                    updated_at: Utc::now(),
                    ..latest.clone()
                };
                self.solutions.insert(accepted);

                let entry = self.knowledge.upsert(KnowledgeEntry::new(
                    solution_id.clone(),
                    version,
                    signature,
                    new_score,
                ));

                Ok(RewardOutcome {
                    solution_id: solution_id.clone(),
                    decision,
                    score,
                    new_version: Some(version),
                    rolled_back_to: None,
                    entry: Some(entry),
                })
            }
            RewardDecision::Rejected => {
                // Rejection never raises a score.
                let new_score = latest.success_score.min(score);
                let version = self.solutions.next_version(solution_id);
                let rejected = forgehand_core_types::ImplementationSolution {
                    version,
                    status: SolutionStatus::Rejected,
                    success_score: new_score,
                    updated_at: Utc::now(),
                    ..latest.clone()
                };
                self.solutions.insert(rejected);

                let rolled_back_to = self.maybe_rollback(solution_id, &latest);

                Ok(RewardOutcome {
                    solution_id: solution_id.clone(),
                    decision,
                    score,
                    new_version: Some(version),
                    rolled_back_to,
                    entry: None,
                })
            }
        }
    }

    /// On rejection inside the rollback window, restore the previous
    /// good version as a new version (history stays append-only).
    fn maybe_rollback(
        &self,
        solution_id: &SolutionId,
        rejected: &forgehand_core_types::ImplementationSolution,
    ) -> Option<SolutionVersion> {
        let age = Utc::now() - rejected.updated_at;
        if age > self.config.rollback_window {
            warn!(
                solution = %solution_id,
                age_secs = age.num_seconds(),
                "rejection outside rollback window, keeping rejected head"
            );
            return None;
        }

        let good = self.solutions.previous_good(solution_id, rejected.version)?;
        let restored_version = self.solutions.next_version(solution_id);
        let restored = forgehand_core_types::ImplementationSolution {
            version: restored_version,
            status: SolutionStatus::RolledBack,
            operations: good.operations.clone(),
            success_score: good.success_score,
            updated_at: Utc::now(),
            ..rejected.clone()
        };
        info!(
            solution = %solution_id,
            from = rejected.version.0,
            to = good.version.0,
            "rolled back to previous good version"
        );
        self.solutions.insert(restored);
        Some(good.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgehand_core_types::{ImplementationSolution, RequestId, ValidationId};

    fn validation(solution: &ImplementationSolution, score: f64) -> ValidationResult {
        ValidationResult {
            id: ValidationId::new(),
            solution_id: solution.id.clone(),
            solution_version: solution.version,
            scenarios: vec![],
            aggregate_score: score,
            created_at: Utc::now(),
        }
    }

    fn engine() -> (Arc<SolutionStore>, Arc<KnowledgeStore>, RewardEngine) {
        let solutions = Arc::new(SolutionStore::default());
        let knowledge = Arc::new(KnowledgeStore::new());
        let engine = RewardEngine::new(
            solutions.clone(),
            knowledge.clone(),
            RewardConfig::default(),
        )
        .unwrap();
        (solutions, knowledge, engine)
    }

    fn seeded_solution(solutions: &SolutionStore) -> ImplementationSolution {
        let solution = ImplementationSolution::new(RequestId::new());
        solutions.insert(solution.clone());
        solution
    }

    #[tokio::test]
    async fn high_score_auto_accepts_and_indexes() {
        let (solutions, knowledge, engine) = engine();
        let solution = seeded_solution(&solutions);

        let outcome = engine
            .apply(
                &solution.id,
                None,
                &validation(&solution, 0.95),
                vec!["login".into()],
            )
            .await
            .unwrap();

        assert_eq!(outcome.decision, RewardDecision::Accepted);
        let head = solutions.latest(&solution.id).unwrap();
        assert_eq!(head.status, SolutionStatus::Accepted);
        assert_eq!(head.version, SolutionVersion(2));
        assert!((head.success_score - 0.95).abs() < 1e-9);
        assert_eq!(knowledge.len(), 1);
    }

    #[tokio::test]
    async fn middling_score_stays_pending() {
        let (solutions, knowledge, engine) = engine();
        let solution = seeded_solution(&solutions);

        let outcome = engine
            .apply(&solution.id, None, &validation(&solution, 0.6), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.decision, RewardDecision::Pending);
        assert!(outcome.new_version.is_none());
        assert_eq!(
            solutions.latest(&solution.id).unwrap().version,
            SolutionVersion(1)
        );
        assert!(knowledge.is_empty());
    }

    #[tokio::test]
    async fn rejection_never_writes_knowledge() {
        let (solutions, knowledge, engine) = engine();
        let solution = seeded_solution(&solutions);

        let outcome = engine
            .apply(
                &solution.id,
                None,
                &validation(&solution, 0.2),
                vec!["junk".into()],
            )
            .await
            .unwrap();

        assert_eq!(outcome.decision, RewardDecision::Rejected);
        assert!(knowledge.is_empty());
        assert_eq!(
            solutions.latest(&solution.id).unwrap().status,
            SolutionStatus::Rejected
        );
    }

    #[tokio::test]
    async fn acceptance_score_is_monotonic() {
        let (solutions, _, engine) = engine();
        let mut solution = ImplementationSolution::new(RequestId::new());
        solution.success_score = 0.92;
        solutions.insert(solution.clone());

        let outcome = engine
            .apply(
                &solution.id,
                Some(RewardDecision::Accepted),
                &validation(&solution, 0.75),
                vec![],
            )
            .await
            .unwrap();

        assert_eq!(outcome.decision, RewardDecision::Accepted);
        // A weaker accepted run cannot pull the earned score down.
        let head = solutions.latest(&solution.id).unwrap();
        assert!((head.success_score - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejection_in_window_rolls_back() {
        let (solutions, _, engine) = engine();
        let base = ImplementationSolution::new(RequestId::new());
        solutions.insert(ImplementationSolution {
            status: SolutionStatus::Validated,
            success_score: 0.85,
            ..base.clone()
        });
        let head = ImplementationSolution {
            version: SolutionVersion(2),
            status: SolutionStatus::Draft,
            updated_at: Utc::now(),
            ..base.clone()
        };
        solutions.insert(head.clone());

        let outcome = engine
            .apply(&base.id, Some(RewardDecision::Rejected), &validation(&head, 0.1), vec![])
            .await
            .unwrap();

        assert_eq!(outcome.rolled_back_to, Some(SolutionVersion(1)));
        let latest = solutions.latest(&base.id).unwrap();
        assert_eq!(latest.status, SolutionStatus::RolledBack);
        assert!((latest.success_score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejection_outside_window_keeps_rejected_head() {
        let (solutions, _, engine) = engine();
        let base = ImplementationSolution::new(RequestId::new());
        solutions.insert(ImplementationSolution {
            status: SolutionStatus::Validated,
            ..base.clone()
        });
        let stale_head = ImplementationSolution {
            version: SolutionVersion(2),
            status: SolutionStatus::Draft,
            updated_at: Utc::now() - Duration::hours(48),
            ..base.clone()
        };
        solutions.insert(stale_head.clone());

        let outcome = engine
            .apply(
                &base.id,
                Some(RewardDecision::Rejected),
                &validation(&stale_head, 0.1),
                vec![],
            )
            .await
            .unwrap();

        assert!(outcome.rolled_back_to.is_none());
        assert_eq!(
            solutions.latest(&base.id).unwrap().status,
            SolutionStatus::Rejected
        );
    }

    #[tokio::test]
    async fn stale_validation_is_rejected() {
        let (solutions, _, engine) = engine();
        let old = seeded_solution(&solutions);
        solutions.insert(ImplementationSolution {
            version: SolutionVersion(2),
            ..old.clone()
        });

        let err = engine
            .apply(&old.id, None, &validation(&old, 0.95), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::StaleValidation { .. }));
    }

    #[tokio::test]
    async fn mismatched_validation_is_rejected() {
        let (solutions, _, engine) = engine();
        let solution = seeded_solution(&solutions);
        let other = ImplementationSolution::new(RequestId::new());

        let err = engine
            .apply(&solution.id, None, &validation(&other, 0.95), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::SolutionMismatch { .. }));
    }

    #[test]
    fn threshold_ordering_is_enforced() {
        let config = RewardConfig {
            accept_threshold: 0.95,
            auto_accept_threshold: 0.9,
            ..RewardConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
