//! Wire types shared between drivers, the locator and the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform login material. Never logged verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

/// A resolved reference to a live DOM node.
///
/// Handles are snapshots of element state at query time; the driver
/// re-checks attachment on every interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Backend-specific node reference.
    pub node_ref: String,

    /// The selector that resolved this handle.
    pub selector: String,

    pub attached: bool,
    pub visible: bool,
    pub enabled: bool,
}

impl ElementHandle {
    /// Whether the element can receive the interaction the caller wants.
    pub fn is_interactable(&self) -> bool {
        self.attached && self.visible && self.enabled
    }
}

/// Screenshot plus accessibility outline of the current page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,

    /// Base64-encoded PNG of the viewport.
    pub screenshot_base64: String,

    /// Flattened accessibility outline, one node per line
    /// (`role "name" selector`), enough context for selector proposals.
    pub outline: Vec<String>,

    pub captured_at: DateTime<Utc>,
}

/// One vision-proposed selector with the provider's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorProposal {
    pub selector: String,
    pub confidence: f64,
    /// Provider's reasoning, kept for diagnostics.
    pub rationale: String,
}

impl SelectorProposal {
    pub fn new(selector: impl Into<String>, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }
}
