//! Scenario probes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use forgehand_core_types::{
    ImplementationSolution, OperationKind, OperationOutcome, ScenarioKind, TestScenario,
};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe failure: {0}")]
    Failed(String),
}

/// Runs one scenario against a solution.
#[async_trait]
pub trait ScenarioProbe: Send + Sync {
    /// `Ok((passed, detail))`; `Err` means the probe itself broke, which
    /// the validator records as a failed scenario.
    async fn run(
        &self,
        solution: &ImplementationSolution,
        scenario: &TestScenario,
    ) -> Result<(bool, String), ProbeError>;
}

/// Deterministic probe over the recorded execution trace.
///
/// No re-execution: each kind inspects what the run already produced.
pub struct ReplayProbe {
    /// Performance scenarios fail when the recorded wall time of any
    /// single operation exceeds this.
    pub slow_op_threshold: Duration,
    /// Performance scenarios also fail past this attempt count per op.
    pub max_attempts_per_op: u32,
}

impl Default for ReplayProbe {
    fn default() -> Self {
        Self {
            slow_op_threshold: Duration::from_secs(20),
            max_attempts_per_op: 3,
        }
    }
}

impl ReplayProbe {
    fn functional(&self, solution: &ImplementationSolution) -> (bool, String) {
        if solution.operations.is_empty() {
            return (false, "solution has no operations".to_string());
        }
        let failed: Vec<String> = solution
            .operations
            .iter()
            .filter(|op| !op.outcome.is_success())
            .map(|op| op.id.to_string())
            .collect();
        if failed.is_empty() {
            (true, "all operations succeeded".to_string())
        } else {
            (false, format!("operations not successful: {}", failed.join(", ")))
        }
    }

    fn edge_case(&self, solution: &ImplementationSolution) -> (bool, String) {
        // Robustness heuristics: inputs carry values, targets carry at
        // least one resolvable hint.
        for op in &solution.operations {
            match op.kind {
                OperationKind::Fill => {
                    if op.parameter_str("value").map_or(true, str::is_empty) {
                        return (false, format!("fill {} has an empty value", op.id));
                    }
                }
                OperationKind::Select => {
                    if op.parameter_str("option").map_or(true, str::is_empty) {
                        return (false, format!("select {} has no option", op.id));
                    }
                }
                OperationKind::Click => {
                    let target = &op.target;
                    if target.label.is_none() && target.candidate_selectors.is_empty() {
                        return (
                            false,
                            format!("click {} has no locator hints beyond prose", op.id),
                        );
                    }
                }
                _ => {}
            }
        }
        (true, "inputs and targets are well formed".to_string())
    }

    fn error_handling(&self, solution: &ImplementationSolution) -> (bool, String) {
        // Every terminal failure must carry a diagnostic capture, and no
        // operation may be left un-run behind a failure.
        let mut saw_failure = false;
        for op in &solution.operations {
            match &op.outcome {
                OperationOutcome::Failed { .. } => {
                    saw_failure = true;
                    if op.capture_after.is_none() {
                        return (false, format!("failed op {} has no capture", op.id));
                    }
                }
                OperationOutcome::Pending if !saw_failure => {
                    return (false, format!("op {} was never executed", op.id));
                }
                _ => {}
            }
        }
        (true, "failures are diagnosable".to_string())
    }

    fn performance(&self, solution: &ImplementationSolution) -> (bool, String) {
        for op in &solution.operations {
            if op.attempts > self.max_attempts_per_op {
                return (
                    false,
                    format!("op {} needed {} attempts", op.id, op.attempts),
                );
            }
            if let Some(ms) = op.duration_ms() {
                if ms > self.slow_op_threshold.as_millis() as i64 {
                    return (false, format!("op {} took {ms}ms", op.id));
                }
            }
        }
        (true, "operations within time and attempt bounds".to_string())
    }
}

#[async_trait]
impl ScenarioProbe for ReplayProbe {
    async fn run(
        &self,
        solution: &ImplementationSolution,
        scenario: &TestScenario,
    ) -> Result<(bool, String), ProbeError> {
        Ok(match scenario.kind {
            ScenarioKind::Functional => self.functional(solution),
            ScenarioKind::EdgeCase => self.edge_case(solution),
            ScenarioKind::ErrorHandling => self.error_handling(solution),
            ScenarioKind::Performance => self.performance(solution),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgehand_core_types::{ElementDescriptor, FailureKind, LowCodeOperation, RequestId};
    use serde_json::json;

    fn scenario(kind: ScenarioKind) -> TestScenario {
        TestScenario::new("probe", kind, "probe scenario")
    }

    fn successful_solution() -> ImplementationSolution {
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
    async fn functional_passes_on_full_success() {
        let probe = ReplayProbe::default();
        let (passed, _) = probe
            .run(&successful_solution(), &scenario(ScenarioKind::Functional))
            .await
            .unwrap();
        assert!(passed);
    }

    #[tokio::test]
    async fn functional_fails_on_empty_solution() {
        let probe = ReplayProbe::default();
        let empty = ImplementationSolution::new(RequestId::new());
        let (passed, detail) = probe
            .run(&empty, &scenario(ScenarioKind::Functional))
            .await
            .unwrap();
        assert!(!passed);
        assert!(detail.contains("no operations"));
    }

    #[tokio::test]
    async fn edge_case_rejects_empty_fill_value() {
        let probe = ReplayProbe::default();
        let mut solution = ImplementationSolution::new(RequestId::new());
        let mut op = LowCodeOperation::new(
            OperationKind::Fill,
            ElementDescriptor::new("name field"),
        )
        .with_parameter("value", json!(""));
        op.outcome = OperationOutcome::Success;
        solution.push_operation(op);

        let (passed, _) = probe
            .run(&solution, &scenario(ScenarioKind::EdgeCase))
            .await
            .unwrap();
        assert!(!passed);
    }

    #[tokio::test]
    async fn error_handling_requires_capture_on_failure() {
        let probe = ReplayProbe::default();
        let mut solution = ImplementationSolution::new(RequestId::new());
        let mut op = LowCodeOperation::new(
            OperationKind::Click,
            ElementDescriptor::new("save").with_selector("#save"),
        );
        op.outcome = OperationOutcome::Failed {
            kind: FailureKind::ElementNotFound,
            message: "gone".into(),
        };
        solution.push_operation(op);

        let (passed, _) = probe
            .run(&solution, &scenario(ScenarioKind::ErrorHandling))
            .await
            .unwrap();
        assert!(!passed);
    }

    #[tokio::test]
    async fn performance_flags_attempt_churn() {
        let probe = ReplayProbe::default();
        let mut solution = successful_solution();
        solution.operations[0].attempts = 5;

        let (passed, detail) = probe
            .run(&solution, &scenario(ScenarioKind::Performance))
            .await
            .unwrap();
        assert!(!passed);
        assert!(detail.contains("attempts"));
    }
}
