//! In-memory driver and vision provider.
//!
//! The fake backend is permissive by default: every registered selector
//! resolves and every interaction succeeds. Tests (and the stub server
//! mode) script failures per method to exercise retry, fallback and
//! session-recovery paths without a real browser.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use forgehand_core_types::ElementDescriptor;

use crate::error::{AdapterError, AdapterResult};
use crate::types::{Credentials, ElementHandle, PageSnapshot, SelectorProposal};
use crate::{PlatformDriver, VisionProvider};

/// A scripted DOM node in the fake page.
#[derive(Debug, Clone)]
pub struct FakeElement {
    pub role: String,
    pub name: String,
    pub attached: bool,
    pub visible: bool,
    pub enabled: bool,
    pub value: Option<String>,
}

impl FakeElement {
    pub fn interactable(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            attached: true,
            visible: true,
            enabled: true,
            value: None,
        }
    }

    pub fn hidden(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            visible: false,
            ..Self::interactable(role, name)
        }
    }

    pub fn disabled(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            enabled: false,
            ..Self::interactable(role, name)
        }
    }
}

#[derive(Default)]
struct FakeState {
    elements: HashMap<String, FakeElement>,
    scripted_failures: HashMap<&'static str, VecDeque<AdapterError>>,
    calls: Vec<String>,
    url: String,
    authenticated: bool,
    /// After this many pings the session reports expired. `None` = never.
    pings_until_expiry: Option<u32>,
    crashed: bool,
}

/// Permissive in-memory [`PlatformDriver`].
#[derive(Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an element under a selector. Chainable at setup time.
    pub fn with_element(self, selector: impl Into<String>, element: FakeElement) -> Self {
        self.state.lock().elements.insert(selector.into(), element);
        self
    }

    pub fn insert_element(&self, selector: impl Into<String>, element: FakeElement) {
        self.state.lock().elements.insert(selector.into(), element);
    }

    pub fn remove_element(&self, selector: &str) {
        self.state.lock().elements.remove(selector);
    }

    /// Queue a failure for the next call to `method` ("click", "query",
    /// "ping", ...). Multiple queued failures drain in order.
    pub fn fail_next(&self, method: &'static str, error: AdapterError) {
        self.state
            .lock()
            .scripted_failures
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Make the session expire after `pings` keep-alive probes.
    pub fn expire_after_pings(&self, pings: u32) {
        self.state.lock().pings_until_expiry = Some(pings);
    }

    /// Every driver call recorded in order, `"method arg"` formatted.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn filled_value(&self, selector: &str) -> Option<String> {
        self.state
            .lock()
            .elements
            .get(selector)
            .and_then(|e| e.value.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    fn record(&self, call: String) {
        debug!(target: "fake_driver", %call, "driver call");
        self.state.lock().calls.push(call);
    }

    fn take_failure(&self, method: &'static str) -> Option<AdapterError> {
        self.state
            .lock()
            .scripted_failures
            .get_mut(method)
            .and_then(VecDeque::pop_front)
    }

    fn check(&self, method: &'static str) -> AdapterResult<()> {
        if let Some(err) = self.take_failure(method) {
            if matches!(err, AdapterError::PageCrash(_)) {
                self.state.lock().crashed = true;
            }
            return Err(err);
        }
        if self.state.lock().crashed {
            return Err(AdapterError::PageCrash("context destroyed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformDriver for FakeDriver {
    async fn open(&self) -> AdapterResult<()> {
        self.record("open".into());
        self.check("open")
    }

    async fn authenticate(&self, credentials: &Credentials) -> AdapterResult<()> {
        self.record(format!("authenticate {}", credentials.username));
        self.check("authenticate")?;
        let mut state = self.state.lock();
        state.authenticated = true;
        state.pings_until_expiry = None;
        Ok(())
    }

    async fn ping(&self) -> AdapterResult<()> {
        self.record("ping".into());
        self.check("ping")?;
        let mut state = self.state.lock();
        if let Some(remaining) = state.pings_until_expiry.as_mut() {
            if *remaining == 0 {
                state.authenticated = false;
                return Err(AdapterError::SessionExpired("keep-alive rejected".into()));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> AdapterResult<()> {
        self.record(format!("navigate {url}"));
        self.check("navigate")?;
        self.state.lock().url = url.to_string();
        Ok(())
    }

    async fn query(&self, selector: &str) -> AdapterResult<Option<ElementHandle>> {
        self.record(format!("query {selector}"));
        self.check("query")?;
        let state = self.state.lock();
        Ok(state.elements.get(selector).map(|e| ElementHandle {
            node_ref: format!("fake:{selector}"),
            selector: selector.to_string(),
            attached: e.attached,
            visible: e.visible,
            enabled: e.enabled,
        }))
    }

    async fn click(&self, handle: &ElementHandle) -> AdapterResult<()> {
        self.record(format!("click {}", handle.selector));
        self.check("click")?;
        if !self.state.lock().elements.contains_key(&handle.selector) {
            return Err(AdapterError::ElementGone(handle.selector.clone()));
        }
        Ok(())
    }

    async fn fill(&self, handle: &ElementHandle, value: &str) -> AdapterResult<()> {
        self.record(format!("fill {} {value}", handle.selector));
        self.check("fill")?;
        let mut state = self.state.lock();
        match state.elements.get_mut(&handle.selector) {
            Some(element) => {
                element.value = Some(value.to_string());
                Ok(())
            }
            None => Err(AdapterError::ElementGone(handle.selector.clone())),
        }
    }

    async fn select(&self, handle: &ElementHandle, option: &str) -> AdapterResult<()> {
        self.record(format!("select {} {option}", handle.selector));
        self.check("select")?;
        let mut state = self.state.lock();
        match state.elements.get_mut(&handle.selector) {
            Some(element) => {
                element.value = Some(option.to_string());
                Ok(())
            }
            None => Err(AdapterError::ElementGone(handle.selector.clone())),
        }
    }

    async fn screenshot(&self) -> AdapterResult<Vec<u8>> {
        self.record("screenshot".into());
        self.check("screenshot")?;
        // Minimal valid PNG header; enough for capture-store tests.
        Ok(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a])
    }

    async fn snapshot(&self) -> AdapterResult<PageSnapshot> {
        self.record("snapshot".into());
        self.check("snapshot")?;
        let png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        let state = self.state.lock();
        let mut outline: Vec<String> = state
            .elements
            .iter()
            .filter(|(_, e)| e.attached)
            .map(|(selector, e)| format!("{} \"{}\" {selector}", e.role, e.name))
            .collect();
        outline.sort();
        Ok(PageSnapshot {
            url: state.url.clone(),
            screenshot_base64: base64::engine::general_purpose::STANDARD.encode(png),
            outline,
            captured_at: Utc::now(),
        })
    }

    async fn restart(&self) -> AdapterResult<()> {
        self.record("restart".into());
        let mut state = self.state.lock();
        state.crashed = false;
        state.authenticated = false;
        state.url.clear();
        Ok(())
    }

    async fn close(&self) -> AdapterResult<()> {
        self.record("close".into());
        Ok(())
    }
}

/// Scriptable [`VisionProvider`]: returns a preset proposal list.
#[derive(Default)]
pub struct FakeVision {
    proposals: Mutex<Vec<SelectorProposal>>,
    calls: Mutex<u32>,
}

impl FakeVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proposal(self, proposal: SelectorProposal) -> Self {
        self.proposals.lock().push(proposal);
        self
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl VisionProvider for FakeVision {
    async fn propose(
        &self,
        _snapshot: &PageSnapshot,
        _descriptor: &ElementDescriptor,
    ) -> AdapterResult<Vec<SelectorProposal>> {
        *self.calls.lock() += 1;
        Ok(self.proposals.lock().clone())
    }
}
