//! Locator errors.

use forgehand_core_types::FailureKind;
use platform_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocatorError {
    /// Every strategy (and the vision fallback, if configured) was
    /// exhausted. `attempted` lists the selectors tried, in order.
    #[error("element not found: {description} (tried {})", attempted.join(", "))]
    ElementNotFound {
        description: String,
        attempted: Vec<String>,
    },

    /// The driver failed mid-resolution; not a "no match" outcome.
    #[error(transparent)]
    Driver(#[from] AdapterError),
}

impl LocatorError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            LocatorError::ElementNotFound { .. } => FailureKind::ElementNotFound,
            LocatorError::Driver(err) => err.failure_kind(),
        }
    }
}
