//! Configuration: defaults, YAML file, environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use element_locator::StrategyKind;
use knowledge_center::RewardConfig;
use solution_validator::ScenarioWeights;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8700".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// Entry page of the low-code application.
    pub app_url: String,
    pub username: String,
    /// Login secret. Prefer the FORGEHAND_SECRET env override over
    /// putting this in a file.
    pub secret: String,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            app_url: "https://platform.local/studio".to_string(),
            username: "forgehand".to_string(),
            secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_sessions: usize,
    pub acquire_timeout_secs: u64,
    pub keep_alive_secs: u64,
    pub reauth_budget: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            acquire_timeout_secs: 30,
            keep_alive_secs: 60,
            reauth_budget: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub op_timeout_secs: u64,
    pub capture_dir: PathBuf,
    pub capture_cap_per_session: usize,
    pub capture_max_age_secs: u64,
    pub script_error_escalation: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            op_timeout_secs: 30,
            capture_dir: PathBuf::from("captures"),
            capture_cap_per_session: 50,
            capture_max_age_secs: 24 * 60 * 60,
            script_error_escalation: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorSettings {
    /// Structural strategy order; strategies not listed never run.
    pub chain: Vec<StrategyKind>,
    /// Ask the vision provider when every structural strategy misses.
    pub ai_fallback_enabled: bool,
    pub vision_confidence_floor: f64,
    pub max_vision_proposals: usize,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            chain: StrategyKind::DEFAULT_CHAIN.to_vec(),
            ai_fallback_enabled: true,
            vision_confidence_floor: 0.7,
            max_vision_proposals: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_operations: usize,
    pub max_substitutions: usize,
    pub seed_similarity_floor: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_operations: 25,
            max_substitutions: 5,
            seed_similarity_floor: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub weights: ScenarioWeights,
    pub scenario_timeout_secs: u64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            weights: ScenarioWeights::default(),
            scenario_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSettings {
    pub snapshot_path: PathBuf,
    pub max_versions: usize,
    /// Hygiene sweep: entries with at least this many uses...
    pub sweep_min_uses: u32,
    /// ...and a success score below this are dropped.
    pub sweep_score_floor: f64,
    /// Entries not used within this window and with fewer than
    /// `sweep_stale_max_uses` uses are dropped as stale.
    pub sweep_max_age_secs: u64,
    pub sweep_stale_max_uses: u32,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("state/knowledge.json"),
            max_versions: 20,
            sweep_min_uses: 5,
            sweep_score_floor: 0.3,
            sweep_max_age_secs: 30 * 24 * 60 * 60,
            sweep_stale_max_uses: 2,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgehandConfig {
    pub server: ServerSettings,
    pub platform: PlatformSettings,
    pub sessions: SessionSettings,
    pub executor: ExecutorSettings,
    pub locator: LocatorSettings,
    pub agent: AgentSettings,
    pub validation: ValidationSettings,
    pub reward: RewardConfig,
    pub knowledge: KnowledgeSettings,
}

impl ForgehandConfig {
    /// Defaults, overlaid by the YAML file (when given), overlaid by
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("FORGEHAND_BIND") {
            self.server.bind = bind;
        }
        if let Ok(url) = std::env::var("FORGEHAND_APP_URL") {
            self.platform.app_url = url;
        }
        if let Ok(username) = std::env::var("FORGEHAND_USERNAME") {
            self.platform.username = username;
        }
        if let Ok(secret) = std::env::var("FORGEHAND_SECRET") {
            self.platform.secret = secret;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validation
            .weights
            .validate()
            .map_err(|e| anyhow::anyhow!("validation.weights: {e}"))?;
        self.reward
            .validate()
            .map_err(|e| anyhow::anyhow!("reward: {e}"))?;
        anyhow::ensure!(
            self.sessions.max_sessions >= 1,
            "sessions.max_sessions must be at least 1"
        );
        anyhow::ensure!(
            self.executor.max_attempts >= 1,
            "executor.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.locator.vision_confidence_floor),
            "locator.vision_confidence_floor must be in [0, 1]"
        );
        anyhow::ensure!(
            !self.locator.chain.is_empty(),
            "locator.chain must name at least one strategy"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.agent.seed_similarity_floor),
            "agent.seed_similarity_floor must be in [0, 1]"
        );
        Ok(())
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.op_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.sessions.acquire_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.keep_alive_secs)
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_secs(self.validation.scenario_timeout_secs)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.knowledge.sweep_max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ForgehandConfig::default().validate().unwrap();
    }

    #[test]
    fn yaml_overlays_defaults() {
        let yaml = r#"
server:
  bind: "0.0.0.0:9000"
agent:
  max_operations: 10
"#;
        let config: ForgehandConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.agent.max_operations, 10);
        // Untouched sections keep their defaults.
        assert_eq!(config.sessions.max_sessions, 4);
    }

    #[test]
    fn locator_chain_is_configurable() {
        let yaml = r#"
locator:
  chain: [dom_id, test_id]
  ai_fallback_enabled: false
"#;
        let config: ForgehandConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.locator.chain,
            vec![StrategyKind::DomId, StrategyKind::TestId]
        );
        assert!(!config.locator.ai_fallback_enabled);
    }

    #[test]
    fn empty_locator_chain_fails_validation() {
        let yaml = "locator:\n  chain: []\n";
        let config: ForgehandConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_weights_fail_validation() {
        let yaml = r#"
validation:
  weights:
    functionality: 0.9
    code_quality: 0.2
    performance: 0.2
    user_satisfaction: 0.2
"#;
        let config: ForgehandConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_ordering_fails_validation() {
        let yaml = r#"
reward:
  accept_threshold: 0.95
  reject_threshold: 0.4
  auto_accept_threshold: 0.9
  rollback_window: 86400
"#;
        let config: ForgehandConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
