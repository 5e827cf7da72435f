//! Domain data model: requests, operations, solutions, validation results
//! and knowledge entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::failure::FailureKind;
use crate::{EntryId, OperationId, RequestId, SolutionId, ValidationId};

/// Request priority, five levels matching the intake API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl Priority {
    /// Map an integer priority (1..=5) onto the enum, clamping out-of-range
    /// values to the nearest level.
    pub fn from_i32(value: i32) -> Self {
        match value {
            i32::MIN..=1 => Priority::Low,
            2 => Priority::Medium,
            3 => Priority::High,
            4 => Priority::Urgent,
            _ => Priority::Critical,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Urgent => 4,
            Priority::Critical => 5,
        }
    }
}

/// A user-submitted feature request. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentRequest {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl DevelopmentRequest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        requirements: Vec<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: RequestId::new(),
            title: title.into(),
            description: description.into(),
            requirements,
            priority,
            created_at: Utc::now(),
        }
    }
}

/// Fixed set of UI action kinds an operation may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Navigate,
    Click,
    Fill,
    Select,
    Wait,
    Screenshot,
    Custom,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Navigate => "navigate",
            OperationKind::Click => "click",
            OperationKind::Fill => "fill",
            OperationKind::Select => "select",
            OperationKind::Wait => "wait",
            OperationKind::Screenshot => "screenshot",
            OperationKind::Custom => "custom",
        }
    }
}

/// Semantic element descriptor: what the element *is*, plus structural
/// hints the locator may try before falling back to vision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Free-text description, e.g. "model name input".
    pub description: String,

    /// ARIA-style role hint ("button", "textbox", ...).
    pub role: Option<String>,

    /// Visible label or accessible name hint.
    pub label: Option<String>,

    /// Candidate selectors in preference order.
    pub candidate_selectors: Vec<String>,
}

impl ElementDescriptor {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.candidate_selectors.push(selector.into());
        self
    }
}

/// Reference into the diagnostic capture store (timestamped file name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRef(pub String);

/// Outcome of a single operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationOutcome {
    Pending,
    Success,
    Failed { kind: FailureKind, message: String },
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationOutcome::Pending)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            OperationOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// One atomic UI action against the low-code platform.
///
/// Owned exclusively by the solution that produced it; append-only once
/// the solution is finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowCodeOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub target: ElementDescriptor,
    pub parameters: Map<String, Value>,
    pub outcome: OperationOutcome,
    pub attempts: u32,
    pub capture_before: Option<CaptureRef>,
    pub capture_after: Option<CaptureRef>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LowCodeOperation {
    pub fn new(kind: OperationKind, target: ElementDescriptor) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            target,
            parameters: Map::new(),
            outcome: OperationOutcome::Pending,
            attempts: 0,
            capture_before: None,
            capture_after: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Monotonically increasing solution version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SolutionVersion(pub u32);

impl SolutionVersion {
    pub fn first() -> Self {
        SolutionVersion(1)
    }

    pub fn next(&self) -> Self {
        SolutionVersion(self.0 + 1)
    }
}

/// Solution lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    Draft,
    Validated,
    Accepted,
    Rejected,
    RolledBack,
}

impl SolutionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            SolutionStatus::Draft => "draft",
            SolutionStatus::Validated => "validated",
            SolutionStatus::Accepted => "accepted",
            SolutionStatus::Rejected => "rejected",
            SolutionStatus::RolledBack => "rolled_back",
        }
    }
}

/// The versioned, ordered operation plan produced for a request.
///
/// Insertion order is execution order. The success score is recomputed
/// from validation results plus reward decisions, never set directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationSolution {
    pub id: SolutionId,
    pub request_id: RequestId,
    pub operations: Vec<LowCodeOperation>,
    pub version: SolutionVersion,
    pub status: SolutionStatus,
    pub success_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImplementationSolution {
    pub fn new(request_id: RequestId) -> Self {
        let now = Utc::now();
        Self {
            id: SolutionId::new(),
            request_id,
            operations: Vec::new(),
            version: SolutionVersion::first(),
            status: SolutionStatus::Draft,
            success_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_operation(&mut self, operation: LowCodeOperation) {
        self.operations.push(operation);
        self.updated_at = Utc::now();
    }

    pub fn all_operations_succeeded(&self) -> bool {
        !self.operations.is_empty() && self.operations.iter().all(|op| op.outcome.is_success())
    }
}

/// Fixed set of validation scenario kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Functional,
    EdgeCase,
    ErrorHandling,
    Performance,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::Functional,
        ScenarioKind::EdgeCase,
        ScenarioKind::ErrorHandling,
        ScenarioKind::Performance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::Functional => "functional",
            ScenarioKind::EdgeCase => "edge_case",
            ScenarioKind::ErrorHandling => "error_handling",
            ScenarioKind::Performance => "performance",
        }
    }
}

/// A declared test scenario for a solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScenario {
    pub name: String,
    pub kind: ScenarioKind,
    pub description: String,
}

impl TestScenario {
    pub fn new(name: impl Into<String>, kind: ScenarioKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
        }
    }
}

/// Per-scenario verdict with diagnostic detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub kind: ScenarioKind,
    pub passed: bool,
    pub detail: String,
    pub duration_ms: u64,
}

/// Result of one validation run against a solution version.
///
/// A solution may accumulate many of these; only the latest is
/// authoritative for reward decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: ValidationId,
    pub solution_id: SolutionId,
    pub solution_version: SolutionVersion,
    pub scenarios: Vec<ScenarioReport>,
    pub aggregate_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed_count() == self.scenarios.len()
    }
}

/// Review verdict on a validated solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardDecision {
    Accepted,
    Rejected,
    Pending,
}

impl RewardDecision {
    pub fn name(&self) -> &'static str {
        match self {
            RewardDecision::Accepted => "accepted",
            RewardDecision::Rejected => "rejected",
            RewardDecision::Pending => "pending",
        }
    }
}

/// A reusable, confidence-scored record of an accepted solution,
/// indexed for similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: EntryId,
    pub solution_id: SolutionId,
    /// Version pinned at acceptance time.
    pub solution_version: SolutionVersion,
    /// Normalized token signature used for similarity search.
    pub signature: Vec<String>,
    pub usage_count: u32,
    pub success_score: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(
        solution_id: SolutionId,
        solution_version: SolutionVersion,
        signature: Vec<String>,
        success_score: f64,
    ) -> Self {
        Self {
            id: EntryId::new(),
            solution_id,
            solution_version,
            signature,
            usage_count: 0,
            success_score,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    /// Record one reuse of this entry, folding the outcome into the
    /// running success score.
    pub fn record_usage(&mut self, success: bool) {
        self.usage_count += 1;
        self.last_used_at = Some(Utc::now());
        let observed = if success { 1.0 } else { 0.0 };
        if self.usage_count == 1 {
            self.success_score = observed;
        } else {
            let prior = self.success_score * f64::from(self.usage_count - 1);
            self.success_score = (prior + observed) / f64::from(self.usage_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_clamps_out_of_range() {
        assert_eq!(Priority::from_i32(0), Priority::Low);
        assert_eq!(Priority::from_i32(3), Priority::High);
        assert_eq!(Priority::from_i32(9), Priority::Critical);
        assert_eq!(Priority::Urgent.as_i32(), 4);
    }

    #[test]
    fn operation_records_parameters() {
        let op = LowCodeOperation::new(
            OperationKind::Fill,
            ElementDescriptor::new("model name input"),
        )
        .with_parameter("value", serde_json::json!("orders"));

        assert_eq!(op.parameter_str("value"), Some("orders"));
        assert_eq!(op.outcome, OperationOutcome::Pending);
        assert_eq!(op.attempts, 0);
    }

    #[test]
    fn solution_push_touches_updated_at() {
        let mut solution = ImplementationSolution::new(RequestId::new());
        let before = solution.updated_at;
        solution.push_operation(LowCodeOperation::new(
            OperationKind::Click,
            ElementDescriptor::new("save button"),
        ));
        assert!(solution.updated_at >= before);
        assert_eq!(solution.operations.len(), 1);
        assert!(!solution.all_operations_succeeded());
    }

    #[test]
    fn entry_usage_updates_running_score() {
        let mut entry = KnowledgeEntry::new(
            SolutionId::new(),
            SolutionVersion::first(),
            vec!["login".into(), "form".into()],
            0.8,
        );

        entry.record_usage(true);
        assert_eq!(entry.usage_count, 1);
        assert!((entry.success_score - 1.0).abs() < f64::EPSILON);

        entry.record_usage(false);
        assert_eq!(entry.usage_count, 2);
        assert!((entry.success_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn version_ordering() {
        let v1 = SolutionVersion::first();
        let v2 = v1.next();
        assert!(v2 > v1);
        assert_eq!(v2, SolutionVersion(2));
    }
}
