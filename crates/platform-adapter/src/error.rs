//! Adapter-level error taxonomy.

use forgehand_core_types::FailureKind;
use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors surfaced by a platform driver or vision provider.
#[derive(Debug, Error, Clone)]
pub enum AdapterError {
    /// The backend did not respond within its own internal deadline.
    #[error("driver timeout: {0}")]
    Timeout(String),

    /// Transport-level failure talking to the platform.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The platform no longer recognizes the session.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// The page or execution context was destroyed.
    #[error("page crashed: {0}")]
    PageCrash(String),

    /// An in-page script raised.
    #[error("script error: {0}")]
    Script(String),

    /// A previously resolved handle no longer points at an attached node.
    #[error("element detached: {0}")]
    ElementGone(String),

    /// The vision provider failed or returned an unusable response.
    #[error("vision failure: {0}")]
    Vision(String),

    /// Bug in the adapter itself.
    #[error("internal: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Classify into the shared failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AdapterError::Timeout(_) => FailureKind::OperationTimeout,
            AdapterError::Transport(_) | AdapterError::Vision(_) => FailureKind::NetworkError,
            AdapterError::SessionExpired(_) => FailureKind::SessionExpired,
            AdapterError::PageCrash(_) => FailureKind::PageCrash,
            AdapterError::Script(_) | AdapterError::Internal(_) => FailureKind::ScriptError,
            AdapterError::ElementGone(_) => FailureKind::ElementNotFound,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_taxonomy() {
        assert_eq!(
            AdapterError::Timeout("nav".into()).failure_kind(),
            FailureKind::OperationTimeout
        );
        assert_eq!(
            AdapterError::SessionExpired("401".into()).failure_kind(),
            FailureKind::SessionExpired
        );
        assert_eq!(
            AdapterError::PageCrash("ctx gone".into()).failure_kind(),
            FailureKind::PageCrash
        );
        assert!(AdapterError::Transport("reset".into()).is_retryable());
        assert!(!AdapterError::Script("ref err".into()).is_retryable());
    }
}
