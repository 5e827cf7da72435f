//! Agent orchestration: pick a plan origin, drive it to a solution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use forgehand_core_types::{
    DevelopmentRequest, FailureKind, ImplementationSolution, KnowledgeEntry,
};
use op_executor::{ExecCtx, ExecError, OperationExecutor};

use crate::plan::{
    plan_from_request, seed_from_entry, substitute_target, AgentLimits, PlanOrigin,
};

#[derive(Debug, Error)]
pub enum AgentError {
    /// The task was cancelled mid-plan; the partial work is discarded
    /// by the caller, not retried.
    #[error("development cancelled: {0}")]
    Cancelled(String),
}

/// A knowledge-store match offered to the agent as a potential seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeCandidate {
    pub entry: KnowledgeEntry,
    pub solution: ImplementationSolution,
    pub similarity: f64,
}

/// What came out of one development run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopOutcome {
    pub solution: ImplementationSolution,
    pub origin: PlanOrigin,
    /// False when execution stopped early; the solution is a partial
    /// draft with the failed operation's outcome recorded.
    pub completed: bool,
}

/// Plans and executes development requests.
pub struct DevelopmentAgent {
    executor: Arc<OperationExecutor>,
    limits: AgentLimits,
}

impl DevelopmentAgent {
    pub fn new(executor: Arc<OperationExecutor>, limits: AgentLimits) -> Self {
        Self { executor, limits }
    }

    pub fn limits(&self) -> &AgentLimits {
        &self.limits
    }

    /// Pick the best seed at or above the similarity floor, preferring
    /// higher similarity, then higher recorded success.
    fn pick_seed<'a>(
        &self,
        candidates: &'a [KnowledgeCandidate],
    ) -> Option<&'a KnowledgeCandidate> {
        candidates
            .iter()
            .filter(|c| c.similarity >= self.limits.seed_similarity_floor)
            .max_by(|a, b| {
                (a.similarity, a.entry.success_score)
                    .partial_cmp(&(b.similarity, b.entry.success_score))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Run one development task end to end.
    ///
    /// Operation failures do not error out: execution stops at the first
    /// failed operation and the partial draft is returned for diagnosis.
    pub async fn develop(
        &self,
        request: &DevelopmentRequest,
        candidates: &[KnowledgeCandidate],
        ctx: &ExecCtx,
    ) -> Result<DevelopOutcome, AgentError> {
        let (ops, origin) = match self.pick_seed(candidates) {
            Some(candidate) => {
                let (ops, substitutions) =
                    seed_from_entry(request, &candidate.solution, &self.limits);
                info!(
                    request = %request.id,
                    entry = %candidate.entry.id,
                    similarity = candidate.similarity,
                    substitutions,
                    "seeding plan from knowledge entry"
                );
                (
                    ops,
                    PlanOrigin::Seeded {
                        entry: candidate.entry.id.clone(),
                        similarity: candidate.similarity,
                        substitutions,
                    },
                )
            }
            None => {
                info!(request = %request.id, "planning from requirements");
                (plan_from_request(request, &self.limits), PlanOrigin::Fresh)
            }
        };

        let mut solution = ImplementationSolution::new(request.id.clone());
        let mut completed = true;

        // Seed-time substitutions and failure-time substitutions share
        // one budget; every execution (substitutes included) spends the
        // operation ceiling.
        let seed_substitutions = match &origin {
            PlanOrigin::Seeded { substitutions, .. } => *substitutions,
            PlanOrigin::Fresh => 0,
        };
        let mut substitutions_left = self
            .limits
            .max_substitutions
            .saturating_sub(seed_substitutions);
        let mut executions_left = self.limits.max_operations;

        let mut queue = ops.into_iter();
        'plan: for op in queue.by_ref() {
            let mut op = op;
            loop {
                if executions_left == 0 {
                    warn!(
                        request = %request.id,
                        "operation ceiling reached, stopping with partial draft"
                    );
                    solution.push_operation(op);
                    completed = false;
                    break 'plan;
                }
                executions_left -= 1;

                match self.executor.execute(&mut op, ctx).await {
                    Ok(()) => {
                        solution.push_operation(op);
                        break;
                    }
                    Err(ExecError::Cancelled(reason)) => {
                        solution.push_operation(op);
                        return Err(AgentError::Cancelled(reason));
                    }
                    Err(err) => {
                        if err.kind() == FailureKind::ElementNotFound && substitutions_left > 0 {
                            if let Some(substitute) = substitute_target(&op) {
                                substitutions_left -= 1;
                                warn!(
                                    request = %request.id,
                                    failed = %op.id,
                                    substitute = %substitute.id,
                                    error = %err,
                                    "locator hints exhausted, substituting and retrying step"
                                );
                                op = substitute;
                                continue;
                            }
                        }
                        warn!(
                            request = %request.id,
                            op = %op.id,
                            error = %err,
                            "operation failed, stopping with partial draft"
                        );
                        solution.push_operation(op);
                        completed = false;
                        break 'plan;
                    }
                }
            }
        }
        // Unexecuted remainder stays in the draft as pending steps.
        for op in queue {
            solution.push_operation(op);
        }

        info!(
            request = %request.id,
            solution = %solution.id,
            operations = solution.operations.len(),
            completed,
            "development run finished"
        );
        Ok(DevelopOutcome {
            solution,
            origin,
            completed,
        })
    }
}
