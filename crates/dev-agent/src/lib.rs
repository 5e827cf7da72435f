//! The development agent.
//!
//! Turns a development request into an ordered operation plan, either
//! from scratch (requirement heuristics) or seeded from a sufficiently
//! similar knowledge entry, then drives the plan through the executor.
//! Planning is bounded: an operation ceiling, and a substitution budget
//! when adapting seeded plans.

pub mod agent;
pub mod plan;

pub use agent::{AgentError, DevelopOutcome, DevelopmentAgent, KnowledgeCandidate};
pub use plan::{plan_from_request, seed_from_entry, substitute_target, AgentLimits, PlanOrigin};
