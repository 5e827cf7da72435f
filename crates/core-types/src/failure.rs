//! Failure taxonomy shared across the stack.
//!
//! Every failure surfaced to a caller is classified as one of these kinds
//! so the HTTP layer can distinguish "the platform UI changed" from "the
//! platform was unreachable" from "the solution did not pass validation".

use serde::{Deserialize, Serialize};

/// Classified failure kinds for low-code operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Locator exhausted every strategy without an attached match.
    ElementNotFound,

    /// An action exceeded its timeout.
    OperationTimeout,

    /// Transport-level failure talking to the platform.
    NetworkError,

    /// Authentication was lost mid-task.
    SessionExpired,

    /// The execution context was destroyed.
    PageCrash,

    /// In-page failure unrelated to the requested action.
    ScriptError,

    /// One or more validation scenarios failed. A result, not a fault.
    ValidationFailure,
}

/// Recovery action associated with a failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry locally with exponential backoff.
    RetryBackoff,

    /// Run the locator fallback chain before surfacing.
    LocatorFallback,

    /// Hand the session back to the session manager for re-auth.
    Reauthenticate,

    /// Restart the session and retry the in-flight operation once.
    RestartSession,

    /// Log and continue; escalate only on recurrence.
    LogAndContinue,

    /// Fatal to the current task; record and surface.
    Fatal,
}

impl FailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::ElementNotFound => "element_not_found",
            FailureKind::OperationTimeout => "operation_timeout",
            FailureKind::NetworkError => "network_error",
            FailureKind::SessionExpired => "session_expired",
            FailureKind::PageCrash => "page_crash",
            FailureKind::ScriptError => "script_error",
            FailureKind::ValidationFailure => "validation_failure",
        }
    }

    /// Whether the executor may retry this failure locally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::OperationTimeout | FailureKind::NetworkError
        )
    }

    /// Recovery action per the propagation policy.
    pub fn recovery(&self) -> RecoveryAction {
        match self {
            FailureKind::OperationTimeout | FailureKind::NetworkError => {
                RecoveryAction::RetryBackoff
            }
            FailureKind::ElementNotFound => RecoveryAction::LocatorFallback,
            FailureKind::SessionExpired => RecoveryAction::Reauthenticate,
            FailureKind::PageCrash => RecoveryAction::RestartSession,
            FailureKind::ScriptError => RecoveryAction::LogAndContinue,
            FailureKind::ValidationFailure => RecoveryAction::Fatal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
