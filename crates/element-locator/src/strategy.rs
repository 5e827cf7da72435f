//! Structural strategies: each derives candidate selectors of one shape
//! from an element descriptor.
//!
//! Strategies never talk to the driver themselves; the resolver queries
//! their selectors so that attempted-selector tracking stays in one place.

use forgehand_core_types::ElementDescriptor;

use crate::types::StrategyKind;

/// One structural resolution strategy.
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Candidate selectors for this descriptor, best first. Empty when
    /// the descriptor carries nothing this strategy can use.
    fn selectors(&self, descriptor: &ElementDescriptor) -> Vec<String>;
}

/// Normalize a label into the token the platform uses in generated
/// ids and test ids: lowercase, runs of non-alphanumerics collapsed
/// to a single dash.
pub(crate) fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut dash_pending = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if dash_pending && !out.is_empty() {
                out.push('-');
            }
            dash_pending = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            dash_pending = true;
        }
    }
    out
}

fn hint(descriptor: &ElementDescriptor) -> Option<String> {
    let text = descriptor
        .label
        .as_deref()
        .unwrap_or(&descriptor.description);
    let s = slug(text);
    (!s.is_empty()).then_some(s)
}

fn candidates_matching(
    descriptor: &ElementDescriptor,
    pred: impl Fn(&str) -> bool,
) -> Vec<String> {
    descriptor
        .candidate_selectors
        .iter()
        .filter(|s| pred(s))
        .cloned()
        .collect()
}

pub struct TestIdStrategy;

impl Strategy for TestIdStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TestId
    }

    fn selectors(&self, descriptor: &ElementDescriptor) -> Vec<String> {
        let mut out = candidates_matching(descriptor, |s| s.contains("data-testid"));
        if let Some(h) = hint(descriptor) {
            out.push(format!("[data-testid=\"{h}\"]"));
        }
        out
    }
}

pub struct DomIdStrategy;

impl Strategy for DomIdStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DomId
    }

    fn selectors(&self, descriptor: &ElementDescriptor) -> Vec<String> {
        let mut out = candidates_matching(descriptor, |s| {
            s.starts_with('#') && !s.contains(' ') && !s.contains('>')
        });
        if let Some(h) = hint(descriptor) {
            out.push(format!("#{h}"));
        }
        out
    }
}

pub struct NameAttrStrategy;

impl Strategy for NameAttrStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NameAttr
    }

    fn selectors(&self, descriptor: &ElementDescriptor) -> Vec<String> {
        let mut out = candidates_matching(descriptor, |s| s.contains("[name="));
        if let Some(h) = hint(descriptor) {
            out.push(format!("[name=\"{h}\"]"));
        }
        out
    }
}

pub struct CssClassStrategy;

impl Strategy for CssClassStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CssClass
    }

    fn selectors(&self, descriptor: &ElementDescriptor) -> Vec<String> {
        let mut out = candidates_matching(descriptor, |s| {
            s.starts_with('.') && !s.contains(' ') && !s.contains('>')
        });
        if let Some(h) = hint(descriptor) {
            out.push(format!(".{h}"));
        }
        out
    }
}

pub struct PathStrategy;

impl Strategy for PathStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Path
    }

    fn selectors(&self, descriptor: &ElementDescriptor) -> Vec<String> {
        // Only caller-supplied path selectors; there is nothing sensible
        // to synthesize from a bare description.
        candidates_matching(descriptor, |s| s.contains('>') || s.trim().contains(' '))
    }
}

pub struct StyleStrategy;

impl Strategy for StyleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Style
    }

    fn selectors(&self, descriptor: &ElementDescriptor) -> Vec<String> {
        candidates_matching(descriptor, |s| s.contains("[style"))
    }
}

/// All strategies in an order-indexed table.
pub fn selectors_for(kind: StrategyKind, descriptor: &ElementDescriptor) -> Vec<String> {
    match kind {
        StrategyKind::TestId => TestIdStrategy.selectors(descriptor),
        StrategyKind::DomId => DomIdStrategy.selectors(descriptor),
        StrategyKind::NameAttr => NameAttrStrategy.selectors(descriptor),
        StrategyKind::CssClass => CssClassStrategy.selectors(descriptor),
        StrategyKind::Path => PathStrategy.selectors(descriptor),
        StrategyKind::Style => StyleStrategy.selectors(descriptor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_collapses_separators() {
        assert_eq!(slug("Save Model"), "save-model");
        assert_eq!(slug("  API   Key!! "), "api-key");
        assert_eq!(slug("---"), "");
    }

    #[test]
    fn test_id_prefers_explicit_candidates() {
        let descriptor = ElementDescriptor::new("save button")
            .with_label("Save Model")
            .with_selector("[data-testid=\"btn-save\"]")
            .with_selector("#save");

        let selectors = TestIdStrategy.selectors(&descriptor);
        assert_eq!(
            selectors,
            vec![
                "[data-testid=\"btn-save\"]".to_string(),
                "[data-testid=\"save-model\"]".to_string(),
            ]
        );
    }

    #[test]
    fn dom_id_ignores_path_candidates() {
        let descriptor = ElementDescriptor::new("save")
            .with_selector("#form > #save")
            .with_selector("#save");

        let selectors = DomIdStrategy.selectors(&descriptor);
        assert!(selectors.contains(&"#save".to_string()));
        assert!(!selectors.contains(&"#form > #save".to_string()));
    }

    #[test]
    fn path_strategy_never_synthesizes() {
        let descriptor = ElementDescriptor::new("save button").with_label("Save");
        assert!(PathStrategy.selectors(&descriptor).is_empty());
    }
}
