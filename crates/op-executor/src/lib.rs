//! Reliable execution of low-code operations.
//!
//! The executor owns the concerns the agent should not think about:
//! exponential-backoff retries for transient failures, crash recovery,
//! diagnostic captures around risky actions, and an idempotence cache so
//! a re-submitted operation never mutates the platform twice.

pub mod capture;
pub mod error;
pub mod executor;
pub mod policy;

pub use capture::{CaptureConfig, CaptureStore};
pub use error::{ExecError, ExecResult};
pub use executor::{ExecCtx, ExecutorConfig, OperationExecutor, SessionRecovery};
pub use policy::RetryPolicy;
