//! Shared primitives for the Forgehand automation stack.
//!
//! Everything that crosses a crate boundary lives here: the id newtypes,
//! the domain data model (requests, operations, solutions, validation
//! results, knowledge entries) and the failure taxonomy.

use std::fmt;

use uuid::Uuid;

pub mod failure;
pub mod model;

pub use failure::{FailureKind, RecoveryAction};
pub use model::*;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::new_v4()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Identifier for a development request.
    RequestId,
    "req"
);
string_id!(
    /// Identifier for a single low-code operation.
    OperationId,
    "op"
);
string_id!(
    /// Identifier for an implementation solution.
    SolutionId,
    "sol"
);
string_id!(
    /// Identifier for one validation run.
    ValidationId,
    "val"
);
string_id!(
    /// Identifier for a knowledge entry.
    EntryId,
    "ke"
);
string_id!(
    /// Identifier for an authenticated platform session.
    SessionId,
    "sess"
);
string_id!(
    /// Identifier for one logical development task.
    TaskId,
    "task"
);
