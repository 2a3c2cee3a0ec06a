//! Runtime configuration for the brain chain.
//!
//! Every section is `#[serde(default)]`, so a YAML file only needs the keys it
//! overrides. Environment variables prefixed `BRAIN_` win over the file.
//!
//! ```yaml
//! judge:
//!   max_iterations: 4
//!   thresholds:
//!     clarity: 0.5
//! inferencer:
//!   decay: 0.7
//! policy:
//!   denied_tools: ["edit_history"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::tools::EnforcementMode;
use crate::error::{BrainError, Result};
use crate::mental::simulator::Criterion;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    pub analyzer: AnalyzerConfig,
    pub inferencer: InferencerConfig,
    pub judge: JudgeConfig,
    pub simulator: SimulatorConfig,
    pub timeouts: TimeoutConfig,
    pub policy: PolicyConfig,
}

/// Emotional analyzer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// `k` in `raw / (raw + k)`.
    pub saturation: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { saturation: 2.0 }
    }
}

/// Per-user mental model cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferencerConfig {
    /// Weight kept from the previous value on each update, in (0, 1).
    pub decay: f32,
    /// Cap on cached users; least-recently-updated models go first.
    pub max_users: usize,
    /// Models idle longer than this are evicted by `evict_idle`.
    pub idle_ttl_secs: Option<u64>,
    /// Attempts at `try_lock_for` before falling back to a blocking lock.
    pub lock_attempts: u32,
    /// Initial backoff between lock attempts; doubles each retry.
    pub lock_backoff_ms: u64,
}

impl InferencerConfig {
    /// Longest accepted `idle_ttl_secs` (ten years).
    pub const MAX_IDLE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
}

impl Default for InferencerConfig {
    fn default() -> Self {
        Self {
            decay: 0.6,
            max_users: 10_000,
            idle_ttl_secs: None,
            lock_attempts: 4,
            lock_backoff_ms: 2,
        }
    }
}

/// Judge/refine loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Maximum judge iterations (`R`).
    pub max_iterations: u32,
    /// Pass threshold per quality check name.
    pub thresholds: BTreeMap<String, f32>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        let thresholds = [
            ("clarity", 0.5),
            ("relevance", 0.3),
            ("factual_consistency", 0.7),
            ("helpfulness", 0.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            max_iterations: 3,
            thresholds,
        }
    }
}

impl JudgeConfig {
    /// Threshold for a check, falling back to 0.5 for checks not listed.
    pub fn threshold(&self, check: &str) -> f32 {
        self.thresholds.get(check).copied().unwrap_or(0.5)
    }
}

/// Scenario scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub weights: BTreeMap<Criterion, f32>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let weights = [
            (Criterion::Clarity, 0.3),
            (Criterion::Relevance, 0.3),
            (Criterion::EmpathyFit, 0.25),
            (Criterion::MisunderstandingRisk, 0.15),
        ]
        .into_iter()
        .collect();
        Self { weights }
    }
}

/// Deadlines for external calls, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub completion_ms: u64,
    pub provider_ms: u64,
    pub tool_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            completion_ms: 20_000,
            provider_ms: 2_000,
            tool_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    /// Completion call deadline.
    pub fn completion(&self) -> Duration {
        Duration::from_millis(self.completion_ms)
    }

    /// Data provider call deadline.
    pub fn provider(&self) -> Duration {
        Duration::from_millis(self.provider_ms)
    }

    /// Tool call deadline.
    pub fn tool(&self) -> Duration {
        Duration::from_millis(self.tool_ms)
    }
}

/// Tool policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Tools never placed on any plan's allow-list.
    pub denied_tools: Vec<String>,
    pub enforcement: EnforcementMode,
}

impl BrainConfig {
    /// Parse a YAML document and validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: BrainConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `BRAIN_*` environment overrides, then re-validate.
    ///
    /// - `BRAIN_JUDGE_MAX_ITERATIONS`
    /// - `BRAIN_INFERENCER_DECAY`
    /// - `BRAIN_COMPLETION_TIMEOUT_MS`
    /// - `BRAIN_PROVIDER_TIMEOUT_MS`
    /// - `BRAIN_TOOL_TIMEOUT_MS`
    /// - `BRAIN_DENIED_TOOLS` (comma separated)
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<u32>("BRAIN_JUDGE_MAX_ITERATIONS")? {
            self.judge.max_iterations = v;
        }
        if let Some(v) = env_parse::<f32>("BRAIN_INFERENCER_DECAY")? {
            self.inferencer.decay = v;
        }
        if let Some(v) = env_parse::<u64>("BRAIN_COMPLETION_TIMEOUT_MS")? {
            self.timeouts.completion_ms = v;
        }
        if let Some(v) = env_parse::<u64>("BRAIN_PROVIDER_TIMEOUT_MS")? {
            self.timeouts.provider_ms = v;
        }
        if let Some(v) = env_parse::<u64>("BRAIN_TOOL_TIMEOUT_MS")? {
            self.timeouts.tool_ms = v;
        }
        if let Ok(raw) = std::env::var("BRAIN_DENIED_TOOLS") {
            self.policy.denied_tools = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        self.validate()?;
        Ok(self)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        let decay = self.inferencer.decay;
        if !(decay > 0.0 && decay < 1.0) {
            return Err(BrainError::Config(format!(
                "inferencer.decay must be in (0, 1), got {decay}"
            )));
        }
        if self.analyzer.saturation <= 0.0 {
            return Err(BrainError::Config(
                "analyzer.saturation must be positive".into(),
            ));
        }
        if self.judge.max_iterations == 0 {
            return Err(BrainError::Config(
                "judge.max_iterations must be at least 1".into(),
            ));
        }
        for (name, t) in &self.judge.thresholds {
            if !(0.0..=1.0).contains(t) {
                return Err(BrainError::Config(format!(
                    "judge threshold '{name}' must be in [0, 1], got {t}"
                )));
            }
        }
        if self.simulator.weights.values().any(|w| *w < 0.0) {
            return Err(BrainError::Config(
                "simulator weights must be non-negative".into(),
            ));
        }
        let sum: f32 = self.simulator.weights.values().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(BrainError::Config(format!(
                "simulator weights must sum to 1.0, got {sum}"
            )));
        }
        if let Some(ttl) = self.inferencer.idle_ttl_secs {
            if ttl > InferencerConfig::MAX_IDLE_TTL_SECS {
                return Err(BrainError::Config(format!(
                    "inferencer.idle_ttl_secs must be at most {}, got {ttl}",
                    InferencerConfig::MAX_IDLE_TTL_SECS
                )));
            }
        }
        if self.inferencer.max_users == 0 {
            return Err(BrainError::Config(
                "inferencer.max_users must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| BrainError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BrainConfig::default();
        config.validate().unwrap();
        assert_eq!(config.judge.max_iterations, 3);
        assert_eq!(config.inferencer.decay, 0.6);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = BrainConfig::from_yaml_str(
            "judge:\n  max_iterations: 5\npolicy:\n  denied_tools: [edit_history]\n",
        )
        .unwrap();
        assert_eq!(config.judge.max_iterations, 5);
        assert_eq!(config.judge.threshold("clarity"), 0.5);
        assert_eq!(config.policy.denied_tools, vec!["edit_history".to_string()]);
        assert_eq!(config.timeouts.completion_ms, 20_000);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = BrainConfig::from_yaml_str(
            "simulator:\n  weights:\n    clarity: 0.5\n    relevance: 0.2\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_decay_bounds() {
        let mut config = BrainConfig::default();
        config.inferencer.decay = 1.0;
        assert!(config.validate().is_err());
        config.inferencer.decay = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(BrainConfig::from_yaml_str("judge:\n  max_iterations: 0\n").is_err());
    }

    #[test]
    fn test_idle_ttl_upper_bound() {
        let err = BrainConfig::from_yaml_str("inferencer:\n  idle_ttl_secs: 100000000000000000\n")
            .unwrap_err();
        assert!(err.to_string().contains("idle_ttl_secs"));
        assert!(BrainConfig::from_yaml_str("inferencer:\n  idle_ttl_secs: 18446744073709551615\n")
            .is_err());
        assert!(BrainConfig::from_yaml_str("inferencer:\n  idle_ttl_secs: 86400\n").is_ok());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "inferencer:\n  decay: 0.75\n  idle_ttl_secs: 60").unwrap();
        let config = BrainConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.inferencer.decay, 0.75);
        assert_eq!(config.inferencer.idle_ttl_secs, Some(60));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BrainConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, BrainError::Io(_)));
    }
}
