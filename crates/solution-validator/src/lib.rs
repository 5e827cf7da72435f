//! Scenario-based validation of implementation solutions.
//!
//! Four scenario kinds probe a solution independently; one slow or
//! failing scenario never poisons the others. The aggregate score is a
//! weighted pass ratio per kind, with weights renormalized over the
//! kinds actually present in the scenario set.

pub mod probe;
pub mod validator;
pub mod weights;

pub use probe::{ProbeError, ReplayProbe, ScenarioProbe};
pub use validator::{default_scenarios, SolutionValidator, ValidatorConfig, ValidatorError};
pub use weights::ScenarioWeights;
