//! The operation executor.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use element_locator::{ElementResolver, RequiredState};
use forgehand_core_types::{
    FailureKind, LowCodeOperation, OperationKind, OperationOutcome, SessionId,
};
use platform_adapter::{AdapterError, PlatformDriver};

use crate::capture::CaptureStore;
use crate::error::{ExecError, ExecResult};
use crate::policy::RetryPolicy;

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub retry: RetryPolicy,
    /// Per-attempt deadline.
    pub op_timeout: Duration,
    /// Capture before/after screenshots around state-changing operations
    /// (click, fill, select, custom). Reads and waits get a capture only
    /// when they fail.
    pub capture_mutations: bool,
    /// Consecutive in-page script errors before the task aborts.
    pub script_error_escalation: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            op_timeout: Duration::from_secs(30),
            capture_mutations: true,
            script_error_escalation: 3,
        }
    }
}

/// Hook for restoring an expired platform session so the current
/// operation can be retried. Wired by whoever owns the session.
#[async_trait]
pub trait SessionRecovery: Send + Sync {
    /// `Ok` means the session is usable again.
    async fn reauthenticate(&self) -> Result<(), String>;
}

/// Per-task execution context.
#[derive(Clone)]
pub struct ExecCtx {
    pub session: SessionId,
    pub cancel: CancellationToken,
    pub recovery: Option<Arc<dyn SessionRecovery>>,
}

impl ExecCtx {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            cancel: CancellationToken::new(),
            recovery: None,
        }
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn SessionRecovery>) -> Self {
        self.recovery = Some(recovery);
        self
    }
}

/// Executes operations against the platform with retries, crash
/// recovery, captures and an idempotence cache.
pub struct OperationExecutor {
    driver: Arc<dyn PlatformDriver>,
    resolver: Arc<dyn ElementResolver>,
    captures: Arc<CaptureStore>,
    config: ExecutorConfig,
    /// Operation ids that already completed successfully. A re-submitted
    /// id short-circuits without touching the platform.
    completed: DashSet<String>,
    consecutive_script_errors: AtomicU32,
}

impl OperationExecutor {
    pub fn new(
        driver: Arc<dyn PlatformDriver>,
        resolver: Arc<dyn ElementResolver>,
        captures: Arc<CaptureStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            driver,
            resolver,
            captures,
            config,
            completed: DashSet::new(),
            consecutive_script_errors: AtomicU32::new(0),
        }
    }

    /// Run one operation to completion, mutating its outcome, attempt
    /// counter, captures and timestamps in place.
    pub async fn execute(&self, op: &mut LowCodeOperation, ctx: &ExecCtx) -> ExecResult<()> {
        if self.completed.contains(&op.id.0) {
            debug!(op = %op.id, "idempotence cache hit, skipping execution");
            op.outcome = OperationOutcome::Success;
            return Ok(());
        }

        op.started_at = Some(chrono::Utc::now());
        if self.config.capture_mutations && is_mutation(op.kind) {
            op.capture_before = self.try_capture(ctx, op, "before").await;
        }

        let mut crash_retried = false;
        let mut reauth_tried = false;
        let result = loop {
            // Cancellation is honored between attempts; a running attempt
            // is never interrupted mid-action.
            if ctx.cancel.is_cancelled() {
                break Err(ExecError::Cancelled(op.id.0.clone()));
            }
            op.attempts += 1;

            match self.run_attempt(op, ctx).await {
                Ok(()) => {
                    self.consecutive_script_errors.store(0, Ordering::Relaxed);
                    break Ok(());
                }
                Err(ExecError::Driver(AdapterError::Script(message))) => {
                    let seen = self.consecutive_script_errors.fetch_add(1, Ordering::Relaxed) + 1;
                    if seen >= self.config.script_error_escalation {
                        break Err(ExecError::ScriptErrorsEscalated {
                            consecutive: seen,
                            last: message,
                        });
                    }
                    // Unrelated in-page noise; the action itself landed.
                    warn!(op = %op.id, %message, seen, "script error logged, continuing");
                    break Ok(());
                }
                Err(err) => {
                    let kind = err.kind();

                    if kind == FailureKind::PageCrash && !crash_retried {
                        crash_retried = true;
                        warn!(op = %op.id, "page crashed, restarting driver for one retry");
                        self.driver.restart().await?;
                        continue;
                    }

                    if kind == FailureKind::SessionExpired && !reauth_tried {
                        if let Some(recovery) = &ctx.recovery {
                            reauth_tried = true;
                            warn!(op = %op.id, "session expired mid-operation, re-authenticating");
                            match recovery.reauthenticate().await {
                                Ok(()) => continue,
                                Err(reason) => {
                                    warn!(op = %op.id, %reason, "re-authentication failed");
                                    break Err(err);
                                }
                            }
                        }
                    }

                    if kind.is_retryable() && self.config.retry.retries_remaining(op.attempts) {
                        let delay = self.config.retry.delay_for(op.attempts);
                        debug!(
                            op = %op.id,
                            attempt = op.attempts,
                            delay_ms = delay.as_millis() as u64,
                            failure = %kind,
                            "transient failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    break Err(self.wrap_exhaustion(err, op.attempts));
                }
            }
        };

        op.finished_at = Some(chrono::Utc::now());
        match result {
            Ok(()) => {
                op.outcome = OperationOutcome::Success;
                if self.config.capture_mutations && is_mutation(op.kind) {
                    op.capture_after = self.try_capture(ctx, op, "after").await;
                }
                self.completed.insert(op.id.0.clone());
                info!(op = %op.id, kind = op.kind.name(), attempts = op.attempts, "operation succeeded");
                Ok(())
            }
            Err(err) => {
                op.outcome = OperationOutcome::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                op.capture_after = self.try_capture(ctx, op, "failure").await;
                warn!(op = %op.id, kind = op.kind.name(), error = %err, "operation failed");
                Err(err)
            }
        }
    }

    fn wrap_exhaustion(&self, err: ExecError, attempts: u32) -> ExecError {
        if !err.kind().is_retryable() || attempts < 2 {
            return err;
        }
        match err {
            ExecError::Driver(source) => ExecError::RetriesExhausted { attempts, source },
            ExecError::Timeout { operation, timeout_ms } => ExecError::RetriesExhausted {
                attempts,
                source: AdapterError::Timeout(format!("{operation} ({timeout_ms}ms)")),
            },
            other => other,
        }
    }

    async fn run_attempt(&self, op: &LowCodeOperation, ctx: &ExecCtx) -> ExecResult<()> {
        match tokio::time::timeout(self.config.op_timeout, self.perform(op, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout {
                operation: format!("{} {}", op.kind.name(), op.target.description),
                timeout_ms: self.config.op_timeout.as_millis() as u64,
            }),
        }
    }

    async fn perform(&self, op: &LowCodeOperation, ctx: &ExecCtx) -> ExecResult<()> {
        match op.kind {
            OperationKind::Navigate => {
                let url = required_param(op, "url")?;
                self.driver.navigate(url).await?;
                Ok(())
            }
            OperationKind::Wait => {
                let ms = op
                    .parameters
                    .get("duration_ms")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(500);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
            OperationKind::Screenshot => {
                let bytes = self.driver.screenshot().await?;
                let capture = self
                    .captures
                    .store(&ctx.session, "screenshot", &bytes)
                    .map_err(|e| ExecError::Capture(e.to_string()))?;
                debug!(op = %op.id, capture = %capture.0, "screenshot stored");
                Ok(())
            }
            OperationKind::Click => {
                let resolution = self
                    .resolver
                    .resolve(&op.target, RequiredState::Interactable)
                    .await?;
                self.driver.click(&resolution.handle).await?;
                Ok(())
            }
            OperationKind::Fill => {
                let value = required_param(op, "value")?;
                let resolution = self
                    .resolver
                    .resolve(&op.target, RequiredState::Interactable)
                    .await?;
                self.driver.fill(&resolution.handle, value).await?;
                Ok(())
            }
            OperationKind::Select => {
                let option = required_param(op, "option")?;
                let resolution = self
                    .resolver
                    .resolve(&op.target, RequiredState::Interactable)
                    .await?;
                self.driver.select(&resolution.handle, option).await?;
                Ok(())
            }
            OperationKind::Custom => {
                // Custom steps carry their effect in parameters and are
                // resolved by the platform itself; nothing to drive here
                // beyond confirming the page is alive.
                self.driver.ping().await?;
                debug!(op = %op.id, "custom operation acknowledged");
                Ok(())
            }
        }
    }

    async fn try_capture(
        &self,
        ctx: &ExecCtx,
        op: &LowCodeOperation,
        label: &str,
    ) -> Option<forgehand_core_types::CaptureRef> {
        let bytes = match self.driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(op = %op.id, error = %err, "capture screenshot failed");
                return None;
            }
        };
        let tag = format!("{}-{label}", op.kind.name());
        match self.captures.store(&ctx.session, &tag, &bytes) {
            Ok(capture) => Some(capture),
            Err(err) => {
                warn!(op = %op.id, error = %err, "capture persist failed");
                None
            }
        }
    }
}

fn is_mutation(kind: OperationKind) -> bool {
    matches!(
        kind,
        OperationKind::Click | OperationKind::Fill | OperationKind::Select | OperationKind::Custom
    )
}

fn required_param<'a>(op: &'a LowCodeOperation, key: &str) -> ExecResult<&'a str> {
    op.parameter_str(key).ok_or_else(|| {
        ExecError::Driver(AdapterError::Internal(format!(
            "operation {} missing parameter '{key}'",
            op.id
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureConfig;
    use element_locator::{DefaultElementResolver, LocatorConfig};
    use forgehand_core_types::{ElementDescriptor, FailureKind};
    use platform_adapter::{FakeDriver, FakeElement};

    struct Harness {
        driver: Arc<FakeDriver>,
        executor: OperationExecutor,
        ctx: ExecCtx,
        _tmp: tempfile::TempDir,
    }

    fn harness(driver: FakeDriver, config: ExecutorConfig) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let driver = Arc::new(driver);
        let resolver = DefaultElementResolver::new(
            driver.clone() as Arc<dyn PlatformDriver>,
            None,
            LocatorConfig::default(),
        );
        let executor = OperationExecutor::new(
            driver.clone(),
            Arc::new(resolver),
            Arc::new(CaptureStore::new(CaptureConfig::new(tmp.path()))),
            config,
        );
        Harness {
            driver,
            executor,
            ctx: ExecCtx::new(SessionId::new()),
            _tmp: tmp,
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                factor: 2.0,
                max_delay_ms: 4,
            },
            op_timeout: Duration::from_secs(2),
            capture_mutations: true,
            script_error_escalation: 3,
        }
    }

    fn click_op() -> LowCodeOperation {
        LowCodeOperation::new(
            OperationKind::Click,
            ElementDescriptor::new("save button").with_selector("#save"),
        )
    }

    fn save_button() -> FakeElement {
        FakeElement::interactable("button", "Save")
    }

    #[tokio::test]
    async fn click_succeeds_with_captures() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        let mut op = click_op();

        h.executor.execute(&mut op, &h.ctx).await.unwrap();
        assert!(op.outcome.is_success());
        assert_eq!(op.attempts, 1);
        assert!(op.capture_before.is_some());
        assert!(op.capture_after.is_some());
        assert!(op.duration_ms().is_some());
    }

    #[tokio::test]
    async fn resubmitted_operation_is_not_replayed() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        let mut op = click_op();

        h.executor.execute(&mut op, &h.ctx).await.unwrap();
        let calls_after_first = h.driver.calls().len();

        op.outcome = OperationOutcome::Pending;
        h.executor.execute(&mut op, &h.ctx).await.unwrap();
        assert!(op.outcome.is_success());
        // No further driver traffic for the cached id.
        assert_eq!(h.driver.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn transient_timeout_is_retried() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        h.driver
            .fail_next("click", AdapterError::Timeout("slow".into()));
        let mut op = click_op();

        h.executor.execute(&mut op, &h.ctx).await.unwrap();
        assert!(op.outcome.is_success());
        assert_eq!(op.attempts, 2);
    }

    #[tokio::test]
    async fn retry_budget_exhausts() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        for _ in 0..3 {
            h.driver
                .fail_next("click", AdapterError::Transport("reset".into()));
        }
        let mut op = click_op();

        let err = h.executor.execute(&mut op, &h.ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(op.outcome.failure_kind(), Some(FailureKind::NetworkError));
    }

    #[tokio::test]
    async fn element_not_found_is_not_retried() {
        let h = harness(FakeDriver::new(), fast_config());
        let mut op = click_op();

        let err = h.executor.execute(&mut op, &h.ctx).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ElementNotFound);
        assert_eq!(op.attempts, 1);
    }

    #[tokio::test]
    async fn page_crash_restarts_and_retries_once() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        h.driver
            .fail_next("click", AdapterError::PageCrash("ctx gone".into()));
        let mut op = click_op();

        h.executor.execute(&mut op, &h.ctx).await.unwrap();
        assert!(op.outcome.is_success());
        assert!(h.driver.calls().iter().any(|c| c == "restart"));
    }

    #[tokio::test]
    async fn script_errors_escalate_after_threshold() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );

        // Two script errors are logged and tolerated.
        for _ in 0..2 {
            h.driver
                .fail_next("click", AdapterError::Script("widget noise".into()));
            let mut op = click_op();
            h.executor.execute(&mut op, &h.ctx).await.unwrap();
            assert!(op.outcome.is_success());
        }

        // The third consecutive one aborts.
        h.driver
            .fail_next("click", AdapterError::Script("widget noise".into()));
        let mut op = click_op();
        let err = h.executor.execute(&mut op, &h.ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ExecError::ScriptErrorsEscalated { consecutive: 3, .. }
        ));
    }

    #[tokio::test]
    async fn clean_success_resets_script_error_streak() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );

        h.driver
            .fail_next("click", AdapterError::Script("noise".into()));
        let mut op = click_op();
        h.executor.execute(&mut op, &h.ctx).await.unwrap();

        // Clean success in between.
        let mut op = click_op();
        h.executor.execute(&mut op, &h.ctx).await.unwrap();

        // Two more script errors stay under the threshold again.
        for _ in 0..2 {
            h.driver
                .fail_next("click", AdapterError::Script("noise".into()));
            let mut op = click_op();
            h.executor.execute(&mut op, &h.ctx).await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancellation_stops_execution() {
        let h = harness(FakeDriver::new(), fast_config());
        h.ctx.cancel.cancel();

        let mut op = LowCodeOperation::new(
            OperationKind::Wait,
            ElementDescriptor::new("settle"),
        )
        .with_parameter("duration_ms", serde_json::json!(5_000));

        let err = h.executor.execute(&mut op, &h.ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Cancelled(_)));
        // Cancelled before the first attempt ever started.
        assert_eq!(op.attempts, 0);
    }

    #[tokio::test]
    async fn cancellation_lets_the_running_attempt_finish() {
        let h = harness(FakeDriver::new(), fast_config());

        let mut op = LowCodeOperation::new(
            OperationKind::Wait,
            ElementDescriptor::new("settle"),
        )
        .with_parameter("duration_ms", serde_json::json!(100));

        let cancel = h.ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        // The in-flight wait completes; only the next operation is cut off.
        h.executor.execute(&mut op, &h.ctx).await.unwrap();
        assert!(op.outcome.is_success());

        let mut next = LowCodeOperation::new(
            OperationKind::Wait,
            ElementDescriptor::new("settle again"),
        );
        let err = h.executor.execute(&mut next, &h.ctx).await.unwrap_err();
        assert!(matches!(err, ExecError::Cancelled(_)));
    }

    struct ScriptedRecovery {
        driver: Arc<FakeDriver>,
        calls: AtomicU32,
        succeed: bool,
    }

    #[async_trait]
    impl SessionRecovery for ScriptedRecovery {
        async fn reauthenticate(&self) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.succeed {
                self.driver
                    .authenticate(&platform_adapter::Credentials::new("dev", "secret"))
                    .await
                    .map_err(|e| e.to_string())
            } else {
                Err("login rejected".into())
            }
        }
    }

    #[tokio::test]
    async fn expired_session_is_reauthenticated_and_retried() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        h.driver
            .fail_next("click", AdapterError::SessionExpired("cookie gone".into()));
        let recovery = Arc::new(ScriptedRecovery {
            driver: h.driver.clone(),
            calls: AtomicU32::new(0),
            succeed: true,
        });
        let ctx = h.ctx.clone().with_recovery(recovery.clone());

        let mut op = click_op();
        h.executor.execute(&mut op, &ctx).await.unwrap();
        assert!(op.outcome.is_success());
        assert_eq!(op.attempts, 2);
        assert_eq!(recovery.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn failed_reauth_surfaces_session_expiry() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        h.driver
            .fail_next("click", AdapterError::SessionExpired("cookie gone".into()));
        let recovery = Arc::new(ScriptedRecovery {
            driver: h.driver.clone(),
            calls: AtomicU32::new(0),
            succeed: false,
        });
        let ctx = h.ctx.clone().with_recovery(recovery.clone());

        let mut op = click_op();
        let err = h.executor.execute(&mut op, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::SessionExpired);
        assert_eq!(recovery.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn expiry_without_recovery_hook_surfaces() {
        let h = harness(
            FakeDriver::new().with_element("#save", save_button()),
            fast_config(),
        );
        h.driver
            .fail_next("click", AdapterError::SessionExpired("cookie gone".into()));

        let mut op = click_op();
        let err = h.executor.execute(&mut op, &h.ctx).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::SessionExpired);
        assert_eq!(op.attempts, 1);
    }

    #[tokio::test]
    async fn non_mutating_operations_skip_surrounding_captures() {
        let h = harness(FakeDriver::new(), fast_config());
        let mut op = LowCodeOperation::new(
            OperationKind::Wait,
            ElementDescriptor::new("settle"),
        )
        .with_parameter("duration_ms", serde_json::json!(1));

        h.executor.execute(&mut op, &h.ctx).await.unwrap();
        assert!(op.capture_before.is_none());
        assert!(op.capture_after.is_none());
    }

    #[tokio::test]
    async fn fill_requires_value_parameter() {
        let h = harness(
            FakeDriver::new().with_element("#name", FakeElement::interactable("textbox", "Name")),
            fast_config(),
        );
        let mut op = LowCodeOperation::new(
            OperationKind::Fill,
            ElementDescriptor::new("name input").with_selector("#name"),
        );

        let err = h.executor.execute(&mut op, &h.ctx).await.unwrap_err();
        assert!(err.to_string().contains("missing parameter"));
    }
}
