//! Locator configuration and result types.

use serde::{Deserialize, Serialize};

use platform_adapter::ElementHandle;

/// Structural resolution strategies in default fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// `data-testid` attribute match.
    TestId,
    /// DOM id selector.
    DomId,
    /// `name` attribute match.
    NameAttr,
    /// Class selector.
    CssClass,
    /// Descendant-combinator path selector.
    Path,
    /// Inline-style attribute match, the last structural resort.
    Style,
}

impl StrategyKind {
    pub const DEFAULT_CHAIN: [StrategyKind; 6] = [
        StrategyKind::TestId,
        StrategyKind::DomId,
        StrategyKind::NameAttr,
        StrategyKind::CssClass,
        StrategyKind::Path,
        StrategyKind::Style,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::TestId => "test_id",
            StrategyKind::DomId => "dom_id",
            StrategyKind::NameAttr => "name_attr",
            StrategyKind::CssClass => "css_class",
            StrategyKind::Path => "path",
            StrategyKind::Style => "style",
        }
    }
}

/// Element state the caller needs before interacting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredState {
    /// Attached to the DOM, possibly hidden.
    Present,
    /// Attached and rendered.
    Visible,
    /// Attached, rendered and enabled.
    Interactable,
}

impl RequiredState {
    pub fn is_satisfied_by(&self, handle: &ElementHandle) -> bool {
        match self {
            RequiredState::Present => handle.attached,
            RequiredState::Visible => handle.attached && handle.visible,
            RequiredState::Interactable => handle.is_interactable(),
        }
    }
}

/// Resolver tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Strategy order. Strategies not listed never run.
    pub chain: Vec<StrategyKind>,

    /// Minimum confidence for a vision proposal to be considered.
    pub vision_confidence_floor: f64,

    /// How many vision proposals to validate before giving up.
    pub max_vision_proposals: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            chain: StrategyKind::DEFAULT_CHAIN.to_vec(),
            vision_confidence_floor: 0.7,
            max_vision_proposals: 3,
        }
    }
}

/// A successful resolution with provenance.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub handle: ElementHandle,

    /// The structural strategy that matched, `None` for vision fallback.
    pub strategy: Option<StrategyKind>,

    /// Vision confidence when the fallback produced the match.
    pub vision_confidence: Option<f64>,
}

impl Resolution {
    pub fn via_vision(&self) -> bool {
        self.strategy.is_none()
    }
}
