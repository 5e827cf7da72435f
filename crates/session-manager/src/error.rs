//! Session errors.

use forgehand_core_types::FailureKind;
use platform_adapter::AdapterError;
use thiserror::Error;

use crate::state::SessionState;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No session became free within the acquire timeout.
    #[error("session pool exhausted after {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// Login (or re-login) was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Re-auth budget spent; the session is done.
    #[error("re-authentication budget exhausted after {attempts} attempts")]
    ReauthExhausted { attempts: u32 },

    /// The state machine rejected a transition.
    #[error("illegal session transition {from} -> {to}")]
    IllegalTransition {
        from: SessionState,
        to: SessionState,
    },

    /// Session used after it left the usable state.
    #[error("session not usable (state: {0})")]
    NotUsable(SessionState),

    #[error(transparent)]
    Driver(#[from] AdapterError),
}

impl SessionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SessionError::PoolExhausted { .. } => FailureKind::OperationTimeout,
            SessionError::AuthFailed(_)
            | SessionError::ReauthExhausted { .. }
            | SessionError::NotUsable(_) => FailureKind::SessionExpired,
            SessionError::IllegalTransition { .. } => FailureKind::ScriptError,
            SessionError::Driver(err) => err.failure_kind(),
        }
    }
}
