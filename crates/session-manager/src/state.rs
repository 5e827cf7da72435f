//! Session state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle states of a platform session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Allocated, not yet connected.
    Created,
    /// Login in flight (first auth or re-auth).
    Authenticating,
    /// Authenticated and usable.
    Active,
    /// Expiry detected; waiting for re-auth.
    Paused,
    /// Re-auth budget exhausted or unrecoverable driver failure.
    Failed,
    /// Torn down.
    Closed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        }
    }

    /// The transition table. Everything not listed is illegal.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Authenticating)
                | (Authenticating, Active)
                | (Authenticating, Failed)
                | (Active, Paused)
                | (Active, Closed)
                | (Active, Failed)
                | (Paused, Authenticating)
                | (Paused, Failed)
                | (Paused, Closed)
                | (Failed, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
