//! Authenticated platform session lifecycle.
//!
//! Sessions move through an explicit state machine; every transition is
//! checked against the table in [`state`]. A keep-alive pulse detects
//! silent expiry and re-authenticates within a bounded budget. The pool
//! caps concurrent sessions and queues acquirers fairly.

pub mod error;
pub mod pool;
pub mod session;
pub mod state;

pub use error::{SessionError, SessionResult};
pub use pool::{SessionLease, SessionPool};
pub use session::{ManagedSession, SessionConfig};
pub use state::SessionState;
