//! Engine configuration
//!
//! The reward policy (four multipliers plus weight bounds) and the engine
//! settings. Both load from TOML and accept `RWPV_*` environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, EngineResult};
use crate::reputation::Outcome;

/// Reward/penalty multipliers and weight bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardPolicy {
    /// Agent right, majority right
    pub reward_correct: f64,
    /// Agent right, majority wrong
    pub reward_minority: f64,
    /// Agent wrong, majority right
    pub penalty_wrong: f64,
    /// Agent wrong, majority wrong
    pub penalty_both_wrong: f64,
    pub weight_min: f64,
    pub weight_max: f64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            reward_correct: 1.05,
            reward_minority: 1.15,
            penalty_wrong: 0.90,
            penalty_both_wrong: 0.85,
            weight_min: 0.1,
            weight_max: 5.0,
        }
    }
}

impl RewardPolicy {
    /// Multiplier applied for an outcome bucket
    pub fn multiplier(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::RewardCorrect => self.reward_correct,
            Outcome::RewardMinority => self.reward_minority,
            Outcome::PenaltyWrong => self.penalty_wrong,
            Outcome::PenaltyBothWrong => self.penalty_both_wrong,
        }
    }

    /// Clamp a weight into `[weight_min, weight_max]`
    pub fn clamp(&self, weight: f64) -> f64 {
        weight.clamp(self.weight_min, self.weight_max)
    }

    /// Check the policy is usable.
    ///
    /// Renormalizing N weights to sum N inside the bounds needs
    /// `weight_min <= 1 <= weight_max`.
    pub fn validate(&self) -> EngineResult<()> {
        let multipliers = [
            ("reward_correct", self.reward_correct),
            ("reward_minority", self.reward_minority),
            ("penalty_wrong", self.penalty_wrong),
            ("penalty_both_wrong", self.penalty_both_wrong),
        ];
        for (name, value) in multipliers {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConsensusError::Config(format!(
                    "{} must be a positive finite number, got {}",
                    name, value
                )));
            }
        }

        if !self.weight_min.is_finite() || !self.weight_max.is_finite() {
            return Err(ConsensusError::Config(
                "weight bounds must be finite".to_string(),
            ));
        }
        if self.weight_min <= 0.0 || self.weight_min > 1.0 || self.weight_max < 1.0 {
            return Err(ConsensusError::Config(format!(
                "weight bounds must satisfy 0 < weight_min <= 1 <= weight_max, got [{}, {}]",
                self.weight_min, self.weight_max
            )));
        }
        Ok(())
    }
}

/// Configuration for the consensus engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-agent deadline for one prediction call
    pub agent_timeout_ms: u64,
    /// Minimum voting confidence for `meets_threshold`
    pub consensus_threshold: f64,
    /// Weight given to every agent at registration and on reset
    pub initial_weight: f64,
    pub policy: RewardPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 2_000,
            consensus_threshold: 0.5,
            initial_weight: 1.0,
            policy: RewardPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with `RWPV_*` environment overrides applied
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ConsensusError::Config(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConsensusError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Per-agent timeout as a `Duration`
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Builder-style timeout override
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder-style policy override
    pub fn with_policy(mut self, policy: RewardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check all settings
    pub fn validate(&self) -> EngineResult<()> {
        self.policy.validate()?;
        if self.agent_timeout_ms == 0 {
            return Err(ConsensusError::Config(
                "agent_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.consensus_threshold) {
            return Err(ConsensusError::Config(format!(
                "consensus_threshold must be in [0, 1], got {}",
                self.consensus_threshold
            )));
        }
        if !self.initial_weight.is_finite()
            || self.initial_weight < self.policy.weight_min
            || self.initial_weight > self.policy.weight_max
        {
            return Err(ConsensusError::Config(format!(
                "initial_weight {} is outside [{}, {}]",
                self.initial_weight, self.policy.weight_min, self.policy.weight_max
            )));
        }
        Ok(())
    }

    /// Overlay `RWPV_*` environment variables and re-validate
    pub fn apply_env_overrides(&mut self) -> EngineResult<()> {
        if let Some(ms) = env_parse::<u64>("RWPV_AGENT_TIMEOUT_MS")? {
            self.agent_timeout_ms = ms;
        }
        if let Some(threshold) = env_parse::<f64>("RWPV_CONSENSUS_THRESHOLD")? {
            self.consensus_threshold = threshold;
        }
        if let Some(min) = env_parse::<f64>("RWPV_WEIGHT_MIN")? {
            self.policy.weight_min = min;
        }
        if let Some(max) = env_parse::<f64>("RWPV_WEIGHT_MAX")? {
            self.policy.weight_max = max;
        }
        self.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> EngineResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConsensusError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Env vars are process-wide; every test touching them holds this lock
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const RWPV_VARS: [&str; 4] = [
        "RWPV_AGENT_TIMEOUT_MS",
        "RWPV_CONSENSUS_THRESHOLD",
        "RWPV_WEIGHT_MIN",
        "RWPV_WEIGHT_MAX",
    ];

    fn clear_rwpv_env() {
        for key in RWPV_VARS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_policy_values() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.reward_correct, 1.05);
        assert_eq!(policy.reward_minority, 1.15);
        assert_eq!(policy.penalty_wrong, 0.90);
        assert_eq!(policy.penalty_both_wrong, 0.85);
        assert_eq!(policy.weight_min, 0.1);
        assert_eq!(policy.weight_max, 5.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_multiplier_per_outcome() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.multiplier(Outcome::RewardCorrect), 1.05);
        assert_eq!(policy.multiplier(Outcome::RewardMinority), 1.15);
        assert_eq!(policy.multiplier(Outcome::PenaltyWrong), 0.90);
        assert_eq!(policy.multiplier(Outcome::PenaltyBothWrong), 0.85);
    }

    #[test]
    fn test_policy_rejects_bad_bounds() {
        let policy = RewardPolicy {
            weight_min: 1.5,
            ..Default::default()
        };
        assert!(matches!(policy.validate(), Err(ConsensusError::Config(_))));

        let policy = RewardPolicy {
            weight_max: 0.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());

        let policy = RewardPolicy {
            penalty_wrong: 0.0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
agent_timeout_ms = 250

[policy]
reward_minority = 1.2
"#,
        )
        .unwrap();

        assert_eq!(config.agent_timeout(), Duration::from_millis(250));
        assert_eq!(config.consensus_threshold, 0.5);
        assert_eq!(config.policy.reward_minority, 1.2);
        assert_eq!(config.policy.reward_correct, 1.05);
    }

    #[test]
    fn test_toml_validation_errors_surface() {
        let err = EngineConfig::from_toml_str("consensus_threshold = 1.5").unwrap_err();
        assert!(err.to_string().contains("consensus_threshold"));

        let err = EngineConfig::from_toml_str("agent_timeout_ms = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_load_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_rwpv_env();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "initial_weight = 2.0").unwrap();
        writeln!(file, "[policy]").unwrap();
        writeln!(file, "weight_max = 3.0").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.initial_weight, 2.0);
        assert_eq!(config.policy.weight_max, 3.0);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = EngineConfig::load("/nonexistent/rwpv.toml").unwrap_err();
        assert!(matches!(err, ConsensusError::Config(_)));
    }

    #[test]
    fn test_initial_weight_must_be_within_bounds() {
        let config = EngineConfig {
            initial_weight: 9.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_apply() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_rwpv_env();
        std::env::set_var("RWPV_AGENT_TIMEOUT_MS", "300");
        std::env::set_var("RWPV_CONSENSUS_THRESHOLD", " 0.7 ");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.agent_timeout(), Duration::from_millis(300));
        assert_eq!(config.consensus_threshold, 0.7);
        assert_eq!(config.policy, RewardPolicy::default());

        // Overrides win over the file
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]").unwrap();
        writeln!(file, "weight_max = 3.0").unwrap();
        std::env::set_var("RWPV_WEIGHT_MAX", "4");
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.policy.weight_max, 4.0);
        assert_eq!(config.agent_timeout_ms, 300);

        clear_rwpv_env();
    }

    #[test]
    fn test_unparsable_env_override_names_key() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_rwpv_env();
        std::env::set_var("RWPV_AGENT_TIMEOUT_MS", "soon");

        let result = EngineConfig::from_env();
        clear_rwpv_env();

        match result {
            Err(ConsensusError::Config(msg)) => {
                assert!(msg.contains("RWPV_AGENT_TIMEOUT_MS"), "got: {}", msg);
                assert!(msg.contains("soon"), "got: {}", msg);
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_override_is_validated() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_rwpv_env();
        std::env::set_var("RWPV_WEIGHT_MIN", "2");

        let mut config = EngineConfig::default();
        let result = config.apply_env_overrides();
        clear_rwpv_env();

        assert!(
            matches!(&result, Err(ConsensusError::Config(msg)) if msg.contains("weight bounds")),
            "got: {:?}",
            result
        );
    }
}
