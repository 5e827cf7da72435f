//! One managed platform session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use forgehand_core_types::SessionId;
use platform_adapter::{AdapterError, Credentials, PlatformDriver};

use crate::error::{SessionError, SessionResult};
use crate::state::SessionState;

/// Session lifecycle knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credentials: Credentials,
    pub keep_alive_interval: Duration,
    /// Re-auth attempts allowed before the session is declared failed.
    /// Failed keep-alive pings spend from the same budget.
    pub reauth_budget: u32,
}

impl SessionConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            keep_alive_interval: Duration::from_secs(60),
            reauth_budget: 3,
        }
    }
}

struct SessionInner {
    state: SessionState,
    reauth_attempts: u32,
    last_activity: DateTime<Utc>,
}

/// A platform session with explicit state tracking.
pub struct ManagedSession {
    id: SessionId,
    driver: Arc<dyn PlatformDriver>,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
    shutdown: CancellationToken,
}

impl ManagedSession {
    pub fn new(driver: Arc<dyn PlatformDriver>, config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            driver,
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                reauth_attempts: 0,
                last_activity: Utc::now(),
            }),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.inner.lock().last_activity
    }

    pub fn driver(&self) -> Arc<dyn PlatformDriver> {
        self.driver.clone()
    }

    fn transition(&self, to: SessionState) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        if !from.can_transition_to(to) {
            return Err(SessionError::IllegalTransition { from, to });
        }
        debug!(session = %self.id, %from, %to, "session transition");
        inner.state = to;
        Ok(())
    }

    /// Connect and authenticate: Created -> Authenticating -> Active.
    pub async fn open(&self) -> SessionResult<()> {
        self.transition(SessionState::Authenticating)?;
        self.driver.open().await?;
        match self.driver.authenticate(&self.config.credentials).await {
            Ok(()) => {
                self.transition(SessionState::Active)?;
                self.touch();
                info!(session = %self.id, "session active");
                Ok(())
            }
            Err(err) => {
                self.transition(SessionState::Failed)?;
                Err(SessionError::AuthFailed(err.to_string()))
            }
        }
    }

    /// Record caller activity; keep-alive uses this to skip idle pings.
    pub fn touch(&self) {
        self.inner.lock().last_activity = Utc::now();
    }

    /// Fail fast when a caller tries to use a non-active session.
    pub fn ensure_usable(&self) -> SessionResult<()> {
        let state = self.state();
        if state.is_usable() {
            Ok(())
        } else {
            Err(SessionError::NotUsable(state))
        }
    }

    /// One keep-alive pulse. Detected expiry pauses the session and
    /// triggers a re-auth within the configured budget.
    pub async fn pulse(&self) -> SessionResult<()> {
        self.ensure_usable()?;
        match self.driver.ping().await {
            Ok(()) => {
                self.inner.lock().reauth_attempts = 0;
                Ok(())
            }
            Err(AdapterError::SessionExpired(reason)) => {
                warn!(session = %self.id, %reason, "session expired, re-authenticating");
                self.transition(SessionState::Paused)?;
                self.reauthenticate().await
            }
            Err(err) => {
                // Transient ping failures spend re-auth budget too; a
                // session that cannot be probed cannot be trusted.
                let attempts = {
                    let mut inner = self.inner.lock();
                    inner.reauth_attempts += 1;
                    inner.reauth_attempts
                };
                if attempts >= self.config.reauth_budget {
                    self.fail();
                    return Err(SessionError::ReauthExhausted { attempts });
                }
                warn!(session = %self.id, error = %err, attempts, "keep-alive ping failed");
                Err(SessionError::Driver(err))
            }
        }
    }

    /// Expiry observed outside the keep-alive (an operation hit a
    /// session-expired error): pause and re-authenticate, spending the
    /// same budget as the pulse path.
    pub async fn recover_expired(&self) -> SessionResult<()> {
        if self.state() != SessionState::Paused {
            self.transition(SessionState::Paused)?;
        }
        self.reauthenticate().await
    }

    /// Paused -> Authenticating -> Active, within the re-auth budget.
    pub async fn reauthenticate(&self) -> SessionResult<()> {
        let attempts = {
            let mut inner = self.inner.lock();
            inner.reauth_attempts += 1;
            inner.reauth_attempts
        };
        if attempts > self.config.reauth_budget {
            self.fail();
            return Err(SessionError::ReauthExhausted { attempts });
        }

        self.transition(SessionState::Authenticating)?;
        match self.driver.authenticate(&self.config.credentials).await {
            Ok(()) => {
                self.transition(SessionState::Active)?;
                self.inner.lock().reauth_attempts = 0;
                info!(session = %self.id, "session re-authenticated");
                Ok(())
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, attempts, "re-authentication failed");
                // Back to Paused so the next pulse can try again.
                let _ = self.transition(SessionState::Paused);
                Err(SessionError::AuthFailed(err.to_string()))
            }
        }
    }

    fn fail(&self) {
        let mut inner = self.inner.lock();
        if inner.state.can_transition_to(SessionState::Failed) {
            inner.state = SessionState::Failed;
        }
    }

    /// Graceful teardown.
    pub async fn close(&self) -> SessionResult<()> {
        self.shutdown.cancel();
        let state = self.state();
        if state == SessionState::Closed {
            return Ok(());
        }
        self.transition(SessionState::Closed)?;
        self.driver.close().await?;
        info!(session = %self.id, "session closed");
        Ok(())
    }

    /// Background keep-alive loop. Runs until [`close`](Self::close) or
    /// budget exhaustion.
    pub async fn run_keepalive(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.keep_alive_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.pulse().await {
                        Ok(()) => {}
                        Err(SessionError::ReauthExhausted { .. }) | Err(SessionError::NotUsable(_)) => break,
                        Err(err) => {
                            debug!(session = %self.id, error = %err, "keep-alive pulse error");
                        }
                    }
                }
            }
        }
    }
}
