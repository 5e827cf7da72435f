//! Scoring weights per scenario kind.

use forgehand_core_types::ScenarioKind;
use serde::{Deserialize, Serialize};

/// Weight of each scenario kind in the aggregate score.
///
/// The defaults mirror the review rubric: functionality dominates, the
/// quality, performance and satisfaction axes share the rest evenly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScenarioWeights {
    pub functionality: f64,
    pub code_quality: f64,
    pub performance: f64,
    pub user_satisfaction: f64,
}

impl Default for ScenarioWeights {
    fn default() -> Self {
        Self {
            functionality: 0.4,
            code_quality: 0.2,
            performance: 0.2,
            user_satisfaction: 0.2,
        }
    }
}

impl ScenarioWeights {
    /// Weight of one scenario kind.
    pub fn for_kind(&self, kind: ScenarioKind) -> f64 {
        match kind {
            ScenarioKind::Functional => self.functionality,
            ScenarioKind::EdgeCase => self.code_quality,
            ScenarioKind::Performance => self.performance,
            ScenarioKind::ErrorHandling => self.user_satisfaction,
        }
    }

    /// Weights must be non-negative and sum to 1.0 (within rounding).
    pub fn validate(&self) -> Result<(), String> {
        let parts = [
            self.functionality,
            self.code_quality,
            self.performance,
            self.user_satisfaction,
        ];
        if parts.iter().any(|w| *w < 0.0) {
            return Err("scenario weights must be non-negative".to_string());
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("scenario weights must sum to 1.0, got {sum}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScenarioWeights::default().validate().unwrap();
    }

    #[test]
    fn bad_sums_are_rejected() {
        let weights = ScenarioWeights {
            functionality: 0.9,
            ..ScenarioWeights::default()
        };
        assert!(weights.validate().is_err());

        let negative = ScenarioWeights {
            functionality: -0.1,
            code_quality: 0.5,
            performance: 0.3,
            user_satisfaction: 0.3,
        };
        assert!(negative.validate().is_err());
    }
}
