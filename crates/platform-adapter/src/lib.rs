//! Driver and vision-provider seams for the low-code platform UI.
//!
//! Everything above this crate talks to the platform through the
//! [`PlatformDriver`] trait; the concrete backend (a real browser bridge
//! or the in-memory fake used by tests and the stub server) is wired in
//! at startup. The [`VisionProvider`] trait is the second seam: given a
//! page snapshot it proposes selectors for an element the structural
//! strategies could not find.

pub mod error;
pub mod fake;
pub mod types;

use async_trait::async_trait;
use forgehand_core_types::ElementDescriptor;

pub use error::{AdapterError, AdapterResult};
pub use fake::{FakeDriver, FakeElement, FakeVision};
pub use types::{Credentials, ElementHandle, PageSnapshot, SelectorProposal};

/// Backend-agnostic handle to the platform UI.
///
/// All methods are cancel-safe; callers own timeouts and retries.
#[async_trait]
pub trait PlatformDriver: Send + Sync {
    /// Start (or attach to) the backing browser context.
    async fn open(&self) -> AdapterResult<()>;

    /// Authenticate against the platform. Idempotent; re-running on an
    /// already-authenticated driver refreshes the login.
    async fn authenticate(&self, credentials: &Credentials) -> AdapterResult<()>;

    /// Lightweight liveness probe used by the session keep-alive pulse.
    async fn ping(&self) -> AdapterResult<()>;

    async fn navigate(&self, url: &str) -> AdapterResult<()>;

    /// Resolve a selector to a live element handle. `Ok(None)` means the
    /// selector matched nothing; errors are transport or page failures.
    async fn query(&self, selector: &str) -> AdapterResult<Option<ElementHandle>>;

    async fn click(&self, handle: &ElementHandle) -> AdapterResult<()>;

    async fn fill(&self, handle: &ElementHandle, value: &str) -> AdapterResult<()>;

    async fn select(&self, handle: &ElementHandle, option: &str) -> AdapterResult<()>;

    /// Raw PNG bytes of the current viewport.
    async fn screenshot(&self) -> AdapterResult<Vec<u8>>;

    /// Screenshot plus accessibility outline, the input to vision fallback.
    async fn snapshot(&self) -> AdapterResult<PageSnapshot>;

    /// Tear down and recreate the backing context after a page crash.
    async fn restart(&self) -> AdapterResult<()>;

    async fn close(&self) -> AdapterResult<()>;
}

/// Vision-assisted element proposal seam.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Propose selectors for the described element, best first. Confidence
    /// is in `[0.0, 1.0]`; the locator applies its own floor.
    async fn propose(
        &self,
        snapshot: &PageSnapshot,
        descriptor: &ElementDescriptor,
    ) -> AdapterResult<Vec<SelectorProposal>>;
}
