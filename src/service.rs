//! Service layer: wires the workspace crates into the three public
//! operations (develop, validate, reward) plus lookups.

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dev_agent::{AgentError, AgentLimits, DevelopmentAgent, KnowledgeCandidate, PlanOrigin};
use element_locator::{DefaultElementResolver, LocatorConfig};
use forgehand_core_types::{
    DevelopmentRequest, FailureKind, ImplementationSolution, Priority, RequestId, RewardDecision,
    SolutionId, SolutionStatus, TestScenario, ValidationResult,
};
use knowledge_center::{
    load_snapshot, save_snapshot, signature_of, KnowledgeStore, RewardEngine, RewardError,
    RewardOutcome, SimilarityProvider, SolutionStore, TokenSimilarity,
};
use op_executor::{
    CaptureConfig, CaptureStore, ExecCtx, ExecutorConfig, OperationExecutor, RetryPolicy,
    SessionRecovery,
};
use platform_adapter::{Credentials, PlatformDriver, VisionProvider};
use session_manager::{ManagedSession, SessionConfig, SessionError, SessionPool};
use solution_validator::{
    default_scenarios, ReplayProbe, SolutionValidator, ValidatorConfig, ValidatorError,
};

use crate::config::ForgehandConfig;
use crate::errors::ApiError;

/// Wire format of `POST /api/low-code/develop`.
#[derive(Debug, Deserialize)]
pub struct DevelopBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    /// 1 (low) to 5 (critical); defaults to medium.
    pub priority: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct DevelopResponse {
    pub request_id: RequestId,
    pub completed: bool,
    pub origin: PlanOrigin,
    pub solution: ImplementationSolution,
}

/// Wire format of `POST /api/low-code/validate`.
#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    pub solution_id: SolutionId,
    /// Defaults to the standard four-scenario set.
    pub scenarios: Option<Vec<TestScenario>>,
}

/// Wire format of `POST /api/low-code/reward`.
#[derive(Debug, Deserialize)]
pub struct RewardBody {
    pub solution_id: SolutionId,
    /// Explicit reviewer decision; omitted means threshold-driven.
    pub decision: Option<RewardDecision>,
}

#[derive(Debug, Serialize)]
pub struct SolutionView {
    pub solution: ImplementationSolution,
    pub validation: Option<ValidationResult>,
}

/// The assembled engine behind the HTTP surface.
pub struct ForgehandService {
    config: ForgehandConfig,
    pool: SessionPool,
    agent: DevelopmentAgent,
    validator: SolutionValidator,
    engine: RewardEngine,
    solutions: Arc<SolutionStore>,
    knowledge: Arc<KnowledgeStore>,
    similarity: Box<dyn SimilarityProvider>,
    requests: DashMap<String, DevelopmentRequest>,
    /// Latest validation run per solution; the reward engine consumes it.
    validations: DashMap<String, ValidationResult>,
}

impl ForgehandService {
    pub fn new(
        config: ForgehandConfig,
        driver: Arc<dyn PlatformDriver>,
        vision: Option<Arc<dyn VisionProvider>>,
    ) -> Result<Self> {
        let solutions = Arc::new(SolutionStore::new(config.knowledge.max_versions));
        let knowledge = Arc::new(KnowledgeStore::new());
        match load_snapshot(&config.knowledge.snapshot_path, &solutions, &knowledge) {
            Ok(true) => info!(
                path = %config.knowledge.snapshot_path.display(),
                "restored knowledge snapshot"
            ),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "could not load knowledge snapshot"),
        }

        let vision = vision.filter(|_| config.locator.ai_fallback_enabled);
        let resolver = Arc::new(DefaultElementResolver::new(
            driver.clone(),
            vision,
            LocatorConfig {
                chain: config.locator.chain.clone(),
                vision_confidence_floor: config.locator.vision_confidence_floor,
                max_vision_proposals: config.locator.max_vision_proposals,
            },
        ));
        let captures = Arc::new(CaptureStore::new(CaptureConfig {
            root: config.executor.capture_dir.clone(),
            per_session_cap: config.executor.capture_cap_per_session,
            max_age: std::time::Duration::from_secs(config.executor.capture_max_age_secs),
        }));
        let executor = Arc::new(OperationExecutor::new(
            driver.clone(),
            resolver,
            captures,
            ExecutorConfig {
                retry: RetryPolicy {
                    max_attempts: config.executor.max_attempts,
                    base_delay_ms: config.executor.base_delay_ms,
                    factor: config.executor.backoff_factor,
                    max_delay_ms: config.executor.max_delay_ms,
                },
                op_timeout: config.op_timeout(),
                capture_mutations: true,
                script_error_escalation: config.executor.script_error_escalation,
            },
        ));

        let agent = DevelopmentAgent::new(
            executor,
            AgentLimits {
                max_operations: config.agent.max_operations,
                max_substitutions: config.agent.max_substitutions,
                seed_similarity_floor: config.agent.seed_similarity_floor,
                app_url: config.platform.app_url.clone(),
            },
        );

        let mut session_config = SessionConfig::new(Credentials::new(
            config.platform.username.clone(),
            config.platform.secret.clone(),
        ));
        session_config.keep_alive_interval = config.keep_alive_interval();
        session_config.reauth_budget = config.sessions.reauth_budget;
        let pool = SessionPool::new(
            driver,
            session_config,
            config.sessions.max_sessions,
            config.acquire_timeout(),
        );

        let validator = SolutionValidator::new(
            Arc::new(ReplayProbe::default()),
            ValidatorConfig {
                weights: config.validation.weights,
                scenario_timeout: config.scenario_timeout(),
            },
        )?;
        let engine = RewardEngine::new(
            solutions.clone(),
            knowledge.clone(),
            config.reward.clone(),
        )?;

        Ok(Self {
            config,
            pool,
            agent,
            validator,
            engine,
            solutions,
            knowledge,
            similarity: Box::new(TokenSimilarity),
            requests: DashMap::new(),
            validations: DashMap::new(),
        })
    }

    /// Develop a solution for a request: seed from knowledge when a
    /// close-enough entry exists, execute, store the draft.
    pub async fn develop(&self, body: DevelopBody) -> Result<DevelopResponse, ApiError> {
        if body.title.trim().is_empty() {
            return Err(ApiError::BadRequest("title must not be empty".into()));
        }
        let request = DevelopmentRequest::new(
            body.title,
            body.description,
            body.requirements,
            Priority::from_i32(body.priority.unwrap_or(2)),
        );
        let signature = signature_of(&request);

        let candidates: Vec<KnowledgeCandidate> = self
            .knowledge
            .search(
                self.similarity.as_ref(),
                &signature,
                self.config.agent.seed_similarity_floor,
            )
            .into_iter()
            .filter_map(|(entry, similarity)| {
                let solution = self
                    .solutions
                    .version(&entry.solution_id, entry.solution_version)
                    .or_else(|| self.solutions.latest(&entry.solution_id))?;
                Some(KnowledgeCandidate {
                    entry,
                    solution,
                    similarity,
                })
            })
            .collect();

        let lease = self.pool.acquire().await.map_err(session_error)?;
        let ctx = ExecCtx::new(lease.session().id().clone())
            .with_recovery(Arc::new(LeaseRecovery(lease.session_handle())));
        let outcome = match self.agent.develop(&request, &candidates, &ctx).await {
            Ok(outcome) => outcome,
            Err(AgentError::Cancelled(reason)) => {
                lease.discard().await;
                return Err(ApiError::failure(FailureKind::OperationTimeout, reason));
            }
        };
        lease.session().touch();
        drop(lease);

        if let PlanOrigin::Seeded { entry, .. } = &outcome.origin {
            self.knowledge.record_usage(entry, outcome.completed);
        }

        self.solutions.insert(outcome.solution.clone());
        self.requests.insert(request.id.0.clone(), request.clone());

        Ok(DevelopResponse {
            request_id: request.id,
            completed: outcome.completed,
            origin: outcome.origin,
            solution: outcome.solution,
        })
    }

    /// Validate the latest version of a solution.
    pub async fn validate(&self, body: ValidateBody) -> Result<ValidationResult, ApiError> {
        let solution = self
            .solutions
            .latest(&body.solution_id)
            .ok_or_else(|| ApiError::NotFound(format!("solution {}", body.solution_id)))?;

        let scenarios = body.scenarios.unwrap_or_else(default_scenarios);
        let result = self
            .validator
            .validate(&solution, &scenarios)
            .await
            .map_err(|err: ValidatorError| ApiError::BadRequest(err.to_string()))?;

        if result.all_passed() && solution.status == SolutionStatus::Draft {
            self.solutions.update_status(
                &solution.id,
                solution.version,
                SolutionStatus::Validated,
            );
        }
        self.validations
            .insert(body.solution_id.0.clone(), result.clone());
        Ok(result)
    }

    /// Apply a reward decision against the latest validation run.
    pub async fn reward(&self, body: RewardBody) -> Result<RewardOutcome, ApiError> {
        let validation = self
            .validations
            .get(&body.solution_id.0)
            .map(|v| v.clone())
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "solution {} has no validation run; validate before rewarding",
                    body.solution_id
                ))
            })?;

        let signature = self.signature_for(&body.solution_id);
        let outcome = self
            .engine
            .apply(&body.solution_id, body.decision, &validation, signature)
            .await
            .map_err(reward_error)?;

        let swept = self.knowledge.sweep_unreliable(
            self.config.knowledge.sweep_min_uses,
            self.config.knowledge.sweep_score_floor,
        ) + self.knowledge.sweep_stale(
            self.config.sweep_max_age(),
            self.config.knowledge.sweep_stale_max_uses,
        );
        if swept > 0 {
            info!(swept, "knowledge hygiene sweep removed entries");
        }
        self.persist();
        Ok(outcome)
    }

    pub fn solution(&self, id: &SolutionId) -> Result<SolutionView, ApiError> {
        let solution = self
            .solutions
            .latest(id)
            .ok_or_else(|| ApiError::NotFound(format!("solution {id}")))?;
        let validation = self.validations.get(&id.0).map(|v| v.clone());
        Ok(SolutionView {
            solution,
            validation,
        })
    }

    /// Signature for knowledge indexing: the originating request when we
    /// still have it, the solution's own operation prose otherwise.
    fn signature_for(&self, solution_id: &SolutionId) -> Vec<String> {
        if let Some(solution) = self.solutions.latest(solution_id) {
            if let Some(request) = self.requests.get(&solution.request_id.0) {
                return signature_of(&request);
            }
            let descriptions: Vec<String> = solution
                .operations
                .iter()
                .map(|op| op.target.description.clone())
                .collect();
            let synthetic = DevelopmentRequest::new(
                "",
                descriptions.join(" "),
                vec![],
                Priority::Medium,
            );
            return signature_of(&synthetic);
        }
        Vec::new()
    }

    fn persist(&self) {
        if let Err(err) = save_snapshot(
            &self.config.knowledge.snapshot_path,
            &self.solutions,
            &self.knowledge,
        ) {
            warn!(error = %err, "knowledge snapshot save failed");
        }
    }

    /// Graceful shutdown: park sessions, flush state.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        self.persist();
    }
}

/// Re-auth hook handed to the executor: an operation that hits session
/// expiry pauses the leased session and logs back in before retrying.
struct LeaseRecovery(Arc<ManagedSession>);

#[async_trait::async_trait]
impl SessionRecovery for LeaseRecovery {
    async fn reauthenticate(&self) -> Result<(), String> {
        self.0.recover_expired().await.map_err(|e| e.to_string())
    }
}

fn session_error(err: SessionError) -> ApiError {
    ApiError::failure(err.failure_kind(), err.to_string())
}

fn reward_error(err: RewardError) -> ApiError {
    match err {
        RewardError::UnknownSolution(id) => ApiError::NotFound(format!("solution {id}")),
        other => ApiError::BadRequest(other.to_string()),
    }
}
