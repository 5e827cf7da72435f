//! Validation runs and weighted aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use forgehand_core_types::{
    ImplementationSolution, ScenarioKind, ScenarioReport, TestScenario, ValidationId,
    ValidationResult,
};

use crate::probe::ScenarioProbe;
use crate::weights::ScenarioWeights;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("no scenarios to run")]
    NoScenarios,

    #[error("invalid scenario weights: {0}")]
    BadWeights(String),
}

/// Validator knobs.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub weights: ScenarioWeights,
    /// Hard deadline per scenario; a scenario that exceeds it fails
    /// alone, without affecting the rest of the run.
    pub scenario_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            weights: ScenarioWeights::default(),
            scenario_timeout: Duration::from_secs(30),
        }
    }
}

/// One standard scenario per kind.
pub fn default_scenarios() -> Vec<TestScenario> {
    vec![
        TestScenario::new(
            "functional-trace",
            ScenarioKind::Functional,
            "every planned operation completed successfully",
        ),
        TestScenario::new(
            "edge-inputs",
            ScenarioKind::EdgeCase,
            "inputs and locator hints hold up under unusual values",
        ),
        TestScenario::new(
            "failure-diagnostics",
            ScenarioKind::ErrorHandling,
            "failures carry enough context to diagnose",
        ),
        TestScenario::new(
            "execution-efficiency",
            ScenarioKind::Performance,
            "operations complete without retry churn or stalls",
        ),
    ]
}

/// Runs scenarios and aggregates the weighted score.
pub struct SolutionValidator {
    probe: Arc<dyn ScenarioProbe>,
    config: ValidatorConfig,
}

impl SolutionValidator {
    pub fn new(probe: Arc<dyn ScenarioProbe>, config: ValidatorConfig) -> Result<Self, ValidatorError> {
        config
            .weights
            .validate()
            .map_err(ValidatorError::BadWeights)?;
        Ok(Self { probe, config })
    }

    /// Run every scenario independently and aggregate.
    pub async fn validate(
        &self,
        solution: &ImplementationSolution,
        scenarios: &[TestScenario],
    ) -> Result<ValidationResult, ValidatorError> {
        if scenarios.is_empty() {
            return Err(ValidatorError::NoScenarios);
        }

        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let started = std::time::Instant::now();
            let outcome =
                tokio::time::timeout(self.config.scenario_timeout, self.probe.run(solution, scenario))
                    .await;

            let (passed, detail) = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    warn!(scenario = %scenario.name, error = %err, "scenario probe failed");
                    (false, format!("probe error: {err}"))
                }
                Err(_) => {
                    warn!(scenario = %scenario.name, "scenario timed out");
                    (
                        false,
                        format!(
                            "timed out after {}ms",
                            self.config.scenario_timeout.as_millis()
                        ),
                    )
                }
            };

            reports.push(ScenarioReport {
                name: scenario.name.clone(),
                kind: scenario.kind,
                passed,
                detail,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let aggregate_score = self.aggregate(&reports);
        info!(
            solution = %solution.id,
            scenarios = reports.len(),
            passed = reports.iter().filter(|r| r.passed).count(),
            score = aggregate_score,
            "validation run complete"
        );

        Ok(ValidationResult {
            id: ValidationId::new(),
            solution_id: solution.id.clone(),
            solution_version: solution.version,
            scenarios: reports,
            aggregate_score,
            created_at: chrono::Utc::now(),
        })
    }

    /// Weighted pass ratio per kind, renormalized over the kinds present
    /// so a complete pass always scores 1.0.
    fn aggregate(&self, reports: &[ScenarioReport]) -> f64 {
        let mut by_kind: BTreeMap<&'static str, (ScenarioKind, u32, u32)> = BTreeMap::new();
        for report in reports {
            let slot = by_kind
                .entry(report.kind.name())
                .or_insert((report.kind, 0, 0));
            slot.2 += 1;
            if report.passed {
                slot.1 += 1;
            }
        }

        let mut weighted = 0.0;
        let mut weight_total = 0.0;
        for (kind, passed, total) in by_kind.values() {
            let weight = self.config.weights.for_kind(*kind);
            weight_total += weight;
            weighted += weight * (*passed as f64 / *total as f64);
        }
        if weight_total <= 0.0 {
            return 0.0;
        }
        (weighted / weight_total).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeError, ReplayProbe};
    use async_trait::async_trait;
    use forgehand_core_types::{
        ElementDescriptor, LowCodeOperation, OperationKind, OperationOutcome, RequestId,
    };
    use serde_json::json;

    fn validator() -> SolutionValidator {
        SolutionValidator::new(
            Arc::new(ReplayProbe::default()),
            ValidatorConfig::default(),
        )
        .unwrap()
    }

    fn passing_solution() -> ImplementationSolution {
        let mut solution = ImplementationSolution::new(RequestId::new());
        let mut op = LowCodeOperation::new(
            OperationKind::Fill,
            ElementDescriptor::new("name field").with_selector("#name"),
        )
        .with_parameter("value", json!("orders"));
        op.outcome = OperationOutcome::Success;
        op.attempts = 1;
        solution.push_operation(op);
        solution
    }

    #[tokio::test]
    async fn full_pass_scores_one() {
        let result = validator()
            .validate(&passing_solution(), &default_scenarios())
            .await
            .unwrap();
        assert!(result.all_passed());
        assert!((result.aggregate_score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn one_minor_failure_scores_point_eight() {
        // Attempt churn fails only the performance scenario (weight 0.2).
        let mut solution = passing_solution();
        solution.operations[0].attempts = 10;

        let result = validator()
            .validate(&solution, &default_scenarios())
            .await
            .unwrap();
        assert_eq!(result.passed_count(), 3);
        assert!((result.aggregate_score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn weights_renormalize_over_present_kinds() {
        let scenarios = vec![
            TestScenario::new("f", ScenarioKind::Functional, "trace"),
            TestScenario::new("p", ScenarioKind::Performance, "speed"),
        ];
        let mut solution = passing_solution();
        solution.operations[0].attempts = 10;

        // Functional passes (0.4), performance fails (0.2): 0.4 / 0.6.
        let result = validator().validate(&solution, &scenarios).await.unwrap();
        assert!((result.aggregate_score - 0.4 / 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_scenario_set_is_rejected() {
        let err = validator()
            .validate(&passing_solution(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ValidatorError::NoScenarios));
    }

    struct StuckProbe;

    #[async_trait]
    impl ScenarioProbe for StuckProbe {
        async fn run(
            &self,
            _solution: &ImplementationSolution,
            scenario: &TestScenario,
        ) -> Result<(bool, String), ProbeError> {
            if scenario.kind == ScenarioKind::Performance {
                // Never completes; the validator's timeout must contain it.
                std::future::pending::<()>().await;
            }
            Ok((true, "ok".to_string()))
        }
    }

    #[tokio::test]
    async fn one_stuck_scenario_does_not_poison_the_run() {
        let validator = SolutionValidator::new(
            Arc::new(StuckProbe),
            ValidatorConfig {
                weights: ScenarioWeights::default(),
                scenario_timeout: Duration::from_millis(20),
            },
        )
        .unwrap();

        let result = validator
            .validate(&passing_solution(), &default_scenarios())
            .await
            .unwrap();
        assert_eq!(result.passed_count(), 3);
        let perf = result
            .scenarios
            .iter()
            .find(|r| r.kind == ScenarioKind::Performance)
            .unwrap();
        assert!(!perf.passed);
        assert!(perf.detail.contains("timed out"));
    }

    #[tokio::test]
    async fn probe_errors_fail_only_their_scenario() {
        struct FlakyProbe;

        #[async_trait]
        impl ScenarioProbe for FlakyProbe {
            async fn run(
                &self,
                _solution: &ImplementationSolution,
                scenario: &TestScenario,
            ) -> Result<(bool, String), ProbeError> {
                if scenario.kind == ScenarioKind::EdgeCase {
                    return Err(ProbeError::Failed("fixture exploded".into()));
                }
                Ok((true, "ok".to_string()))
            }
        }

        let validator = SolutionValidator::new(
            Arc::new(FlakyProbe),
            ValidatorConfig::default(),
        )
        .unwrap();
        let result = validator
            .validate(&passing_solution(), &default_scenarios())
            .await
            .unwrap();
        assert_eq!(result.passed_count(), 3);
        assert!((result.aggregate_score - 0.8).abs() < 1e-9);
    }
}
