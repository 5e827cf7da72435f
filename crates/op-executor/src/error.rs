//! Executor errors.

use forgehand_core_types::FailureKind;
use platform_adapter::AdapterError;
use thiserror::Error;

use element_locator::LocatorError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    /// One attempt exceeded the per-operation timeout.
    #[error("operation timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// The retry budget ran out on a transient failure.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: AdapterError,
    },

    /// In-page failures recurred past the escalation threshold.
    #[error("script errors escalated after {consecutive} consecutive occurrences: {last}")]
    ScriptErrorsEscalated { consecutive: u32, last: String },

    /// The caller cancelled the task mid-operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Driver(#[from] AdapterError),

    /// Diagnostic capture could not be persisted.
    #[error("capture store failure: {0}")]
    Capture(String),
}

impl ExecError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecError::Timeout { .. } => FailureKind::OperationTimeout,
            ExecError::RetriesExhausted { source, .. } => source.failure_kind(),
            ExecError::ScriptErrorsEscalated { .. } => FailureKind::ScriptError,
            ExecError::Cancelled(_) => FailureKind::OperationTimeout,
            ExecError::Locator(err) => err.failure_kind(),
            ExecError::Driver(err) => err.failure_kind(),
            ExecError::Capture(_) => FailureKind::ScriptError,
        }
    }
}
