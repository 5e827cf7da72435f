//! Bounded session pool.
//!
//! Capacity is a semaphore: acquirers queue on it fairly and time out
//! with [`SessionError::PoolExhausted`]. Healthy sessions are reused;
//! a dropped lease returns its session to the idle set only while the
//! session is still usable.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use platform_adapter::PlatformDriver;

use crate::error::{SessionError, SessionResult};
use crate::session::{ManagedSession, SessionConfig};

/// Pool of managed sessions with a hard concurrency cap.
pub struct SessionPool {
    driver: Arc<dyn PlatformDriver>,
    session_config: SessionConfig,
    acquire_timeout: Duration,
    idle: Arc<Mutex<Vec<Arc<ManagedSession>>>>,
    capacity: Arc<Semaphore>,
}

impl SessionPool {
    pub fn new(
        driver: Arc<dyn PlatformDriver>,
        session_config: SessionConfig,
        max_sessions: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            session_config,
            acquire_timeout,
            idle: Arc::new(Mutex::new(Vec::new())),
            capacity: Arc::new(Semaphore::new(max_sessions)),
        }
    }

    /// Acquire a session, queueing behind other acquirers when the pool
    /// is at capacity.
    pub async fn acquire(&self) -> SessionResult<SessionLease> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            self.capacity.clone().acquire_owned(),
        )
        .await
        .map_err(|_| SessionError::PoolExhausted {
            waited_ms: self.acquire_timeout.as_millis() as u64,
        })?
        .map_err(|_| SessionError::PoolExhausted { waited_ms: 0 })?;

        // Reuse the most recently parked healthy session.
        loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(session) if session.state().is_usable() => {
                    debug!(session = %session.id(), "reusing idle session");
                    session.touch();
                    return Ok(SessionLease {
                        session,
                        idle: self.idle.clone(),
                        _permit: permit,
                        discarded: false,
                    });
                }
                Some(stale) => {
                    debug!(session = %stale.id(), state = %stale.state(), "dropping stale idle session");
                    continue;
                }
                None => break,
            }
        }

        let session = Arc::new(ManagedSession::new(
            self.driver.clone(),
            self.session_config.clone(),
        ));
        session.open().await?;
        tokio::spawn(session.clone().run_keepalive());
        info!(session = %session.id(), "session created");

        Ok(SessionLease {
            session,
            idle: self.idle.clone(),
            _permit: permit,
            discarded: false,
        })
    }

    /// Close every idle session. In-flight leases finish on their own.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.idle.lock().drain(..).collect();
        for session in sessions {
            let _ = session.close().await;
        }
    }
}

/// Exclusive use of one pooled session. Dropping the lease returns the
/// session to the pool; [`discard`](Self::discard) tears it down instead.
pub struct SessionLease {
    session: Arc<ManagedSession>,
    idle: Arc<Mutex<Vec<Arc<ManagedSession>>>>,
    _permit: OwnedSemaphorePermit,
    discarded: bool,
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("discarded", &self.discarded)
            .finish_non_exhaustive()
    }
}

impl SessionLease {
    pub fn session(&self) -> &ManagedSession {
        &self.session
    }

    /// Shared handle, for hooks that outlive the borrow of the lease.
    pub fn session_handle(&self) -> Arc<ManagedSession> {
        self.session.clone()
    }

    /// Tear the session down instead of returning it, for callers that
    /// know the session is poisoned (mid-task cancel, crash loops).
    pub async fn discard(mut self) {
        self.discarded = true;
        let _ = self.session.close().await;
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.discarded && self.session.state().is_usable() {
            self.idle.lock().push(self.session.clone());
        }
        // The permit drops with the lease, waking the next acquirer.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_adapter::{Credentials, FakeDriver};

    fn pool(max: usize, acquire_timeout_ms: u64) -> SessionPool {
        SessionPool::new(
            Arc::new(FakeDriver::new()),
            SessionConfig::new(Credentials::new("dev", "secret")),
            max,
            Duration::from_millis(acquire_timeout_ms),
        )
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let pool = pool(1, 50);
        let lease = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, SessionError::PoolExhausted { .. }));
        drop(lease);
    }

    #[tokio::test]
    async fn released_sessions_are_reused() {
        let pool = pool(1, 50);
        let lease = pool.acquire().await.unwrap();
        let first_id = lease.session().id().clone();
        drop(lease);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(*lease.session().id(), first_id);
    }

    #[tokio::test]
    async fn discarded_sessions_are_not_reused() {
        let pool = pool(1, 50);
        let lease = pool.acquire().await.unwrap();
        let first_id = lease.session().id().clone();
        lease.discard().await;

        let lease = pool.acquire().await.unwrap();
        assert_ne!(*lease.session().id(), first_id);
    }

    #[tokio::test]
    async fn queued_acquirer_wakes_on_release() {
        let pool = Arc::new(pool(1, 2_000));
        let lease = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|l| l.session().id().clone()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(lease);

        let acquired = waiter.await.unwrap().unwrap();
        assert!(acquired.0.starts_with("sess-"));
    }
}
