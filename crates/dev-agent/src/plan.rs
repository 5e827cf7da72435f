//! Plan construction: requirement heuristics and knowledge seeding.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use forgehand_core_types::{
    DevelopmentRequest, ElementDescriptor, EntryId, ImplementationSolution, LowCodeOperation,
    OperationId, OperationKind, OperationOutcome,
};

/// Planning bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLimits {
    /// Hard ceiling on operations per solution.
    pub max_operations: usize,

    /// Parameter substitutions allowed when adapting a seeded plan.
    /// Each substitution spends one slot of the operation ceiling.
    pub max_substitutions: usize,

    /// Minimum similarity for a knowledge entry to seed a plan.
    pub seed_similarity_floor: f64,

    /// Entry page of the platform application.
    pub app_url: String,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_operations: 25,
            max_substitutions: 5,
            seed_similarity_floor: 0.6,
            app_url: "https://platform.local/studio".to_string(),
        }
    }
}

/// Where a plan came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum PlanOrigin {
    Fresh,
    Seeded {
        entry: EntryId,
        similarity: f64,
        substitutions: usize,
    },
}

/// First double- or single-quoted span in the text, if any.
fn quoted(text: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let mut parts = text.splitn(3, quote);
        let _before = parts.next()?;
        if let (Some(inner), Some(_rest)) = (parts.next(), parts.next()) {
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    None
}

fn descriptor_from(text: &str) -> ElementDescriptor {
    let mut descriptor = ElementDescriptor::new(text.trim());
    if let Some(label) = quoted(text) {
        descriptor = descriptor.with_label(label);
    }
    descriptor
}

/// Map one requirement line onto an operation.
fn operation_for(requirement: &str) -> LowCodeOperation {
    let lower = requirement.to_lowercase();

    if lower.contains("button") || lower.starts_with("click") || lower.starts_with("press") {
        LowCodeOperation::new(OperationKind::Click, descriptor_from(requirement))
    } else if lower.contains("select") || lower.contains("dropdown") || lower.contains("choose") {
        let mut op = LowCodeOperation::new(OperationKind::Select, descriptor_from(requirement));
        if let Some(value) = quoted(requirement) {
            op = op.with_parameter("option", json!(value));
        }
        op
    } else if lower.contains("field")
        || lower.contains("input")
        || lower.contains("enter")
        || lower.contains("fill")
        || lower.contains("type")
    {
        let mut op = LowCodeOperation::new(OperationKind::Fill, descriptor_from(requirement));
        op = op.with_parameter("value", json!(quoted(requirement).unwrap_or_default()));
        op
    } else if lower.contains("wait") {
        LowCodeOperation::new(OperationKind::Wait, descriptor_from(requirement))
            .with_parameter("duration_ms", json!(1_000))
    } else {
        LowCodeOperation::new(OperationKind::Custom, descriptor_from(requirement))
            .with_parameter("note", json!(requirement))
    }
}

/// Build a fresh plan from requirement heuristics: open the app, one
/// operation per requirement, a closing screenshot for evidence.
pub fn plan_from_request(
    request: &DevelopmentRequest,
    limits: &AgentLimits,
) -> Vec<LowCodeOperation> {
    let mut ops = Vec::with_capacity(request.requirements.len() + 2);

    ops.push(
        LowCodeOperation::new(
            OperationKind::Navigate,
            ElementDescriptor::new("platform application"),
        )
        .with_parameter("url", json!(limits.app_url)),
    );

    for requirement in &request.requirements {
        ops.push(operation_for(requirement));
    }

    ops.push(LowCodeOperation::new(
        OperationKind::Screenshot,
        ElementDescriptor::new("final state"),
    ));

    cap_plan(ops, limits.max_operations)
}

fn cap_plan(mut ops: Vec<LowCodeOperation>, cap: usize) -> Vec<LowCodeOperation> {
    if ops.len() > cap {
        warn!(planned = ops.len(), cap, "plan truncated at operation ceiling");
        ops.truncate(cap);
    }
    ops
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

fn overlaps(a: &str, b: &str) -> bool {
    let ta = tokens(a);
    let tb = tokens(b);
    ta.iter().any(|t| tb.contains(t))
}

/// Adapt an accepted solution to a new request.
///
/// Operations are copied with fresh ids and reset outcomes. For each
/// requirement carrying a quoted value, the first matching fill/select
/// step gets its parameter replaced, within the substitution budget.
/// Spent substitutions shrink the remaining operation ceiling.
pub fn seed_from_entry(
    request: &DevelopmentRequest,
    seed: &ImplementationSolution,
    limits: &AgentLimits,
) -> (Vec<LowCodeOperation>, usize) {
    let mut ops: Vec<LowCodeOperation> = seed
        .operations
        .iter()
        .map(|op| LowCodeOperation {
            id: OperationId::new(),
            outcome: OperationOutcome::Pending,
            attempts: 0,
            capture_before: None,
            capture_after: None,
            started_at: None,
            finished_at: None,
            created_at: chrono::Utc::now(),
            ..op.clone()
        })
        .collect();

    let mut substitutions = 0usize;
    let mut consumed = vec![false; ops.len()];

    for requirement in &request.requirements {
        if substitutions >= limits.max_substitutions {
            debug!("substitution budget spent, remaining requirements keep seeded values");
            break;
        }
        let Some(value) = quoted(requirement) else {
            continue;
        };

        for (idx, op) in ops.iter_mut().enumerate() {
            if consumed[idx] {
                continue;
            }
            let key = match op.kind {
                OperationKind::Fill => "value",
                OperationKind::Select => "option",
                _ => continue,
            };
            if !overlaps(&op.target.description, requirement) {
                continue;
            }
            debug!(op = %op.id, requirement, "substituting seeded parameter");
            op.parameters.insert(key.to_string(), json!(value));
            consumed[idx] = true;
            substitutions += 1;
            break;
        }
    }

    let cap = limits.max_operations.saturating_sub(substitutions);
    (cap_plan(ops, cap), substitutions)
}

/// Build a substitute for a step whose locator hints failed: same kind
/// and parameters, fresh id, weaker-but-different hints. Candidate
/// selectors go first (stale recordings are the usual culprit), then a
/// misleading label, letting the locator derive from the description.
/// `None` when there is nothing left to vary.
pub fn substitute_target(op: &LowCodeOperation) -> Option<LowCodeOperation> {
    let mut target = op.target.clone();
    if !target.candidate_selectors.is_empty() {
        target.candidate_selectors.clear();
    } else if target.label.is_some() {
        target.label = None;
    } else {
        return None;
    }
    let mut substitute = LowCodeOperation::new(op.kind, target);
    substitute.parameters = op.parameters.clone();
    Some(substitute)
}
