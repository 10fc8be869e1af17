// src/infra/config.rs — Runtime configuration (TOML)

use serde::{Deserialize, Serialize};

use crate::infra::errors::{FlywheelError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub evolution: EvolutionConfig,

    #[serde(default)]
    pub versioning: VersioningConfig,

    #[serde(default)]
    pub experiments: ExperimentConfig,

    #[serde(default)]
    pub goals: GoalConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub subagents: SubagentConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl RuntimeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FlywheelError::Config(e.to_string()))
    }
}

/// Spend limits in USD. A limit of 0 means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub daily_limit_usd: f64,
    pub monthly_limit_usd: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: 10.0,
            monthly_limit_usd: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Restrict selection to a single provider (e.g. "anthropic").
    pub provider_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Runs a skill must accumulate before deprecation is considered.
    pub observation_runs: u64,
    /// Fitness below this (after observation) marks a skill for deprecation.
    pub deprecation_threshold: f64,
    pub success_weight: f64,
    pub quality_weight: f64,
    pub cost_weight: f64,
    pub speed_weight: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            observation_runs: 5,
            deprecation_threshold: 0.3,
            success_weight: 0.35,
            quality_weight: 0.30,
            cost_weight: 0.20,
            speed_weight: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Completed runs observed before a change is judged.
    pub window_size: u64,
    /// Minimum current/baseline quality ratio to accept a change.
    pub rollback_threshold: f64,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            rollback_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub min_samples: usize,
    pub significance_threshold: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            significance_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalConfig {
    pub max_attempts: u32,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_input_length: usize,
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// Requests allowed per source within one interval.
    pub rate_limit: usize,
    pub rate_interval_secs: u64,
    pub max_concurrent_runs: u32,
    pub require_approval: bool,
    #[serde(default)]
    pub forbidden_tools: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_input_length: 100_000,
            blocklist: Vec::new(),
            rate_limit: 60,
            rate_interval_secs: 60,
            max_concurrent_runs: 4,
            require_approval: false,
            forbidden_tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pattern repetitions before a code-skill generation goal is emitted.
    pub auto_threshold: u64,
    /// Review score used when the SCORE line cannot be parsed.
    pub default_quality: f64,
    pub llm_timeout_secs: u64,
    /// Below this review score an investigation goal is enqueued.
    pub low_quality_threshold: f64,
    /// At or above this review score an SKB insight is stored.
    pub skb_quality_threshold: f64,
    /// Short-term memory entries included in execution context.
    pub recent_history: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_threshold: 3,
            default_quality: 0.8,
            llm_timeout_secs: 120,
            low_quality_threshold: 0.5,
            skb_quality_threshold: 0.7,
            recent_history: 6,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubagentConfig {
    /// Per-delegation timeout. None means wait indefinitely.
    pub task_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    pub timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.budget.daily_limit_usd, 10.0);
        assert_eq!(cfg.evolution.observation_runs, 5);
        assert!((cfg.evolution.deprecation_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(cfg.versioning.window_size, 5);
        assert_eq!(cfg.experiments.min_samples, 10);
        assert_eq!(cfg.goals.max_attempts, 3);
        assert_eq!(cfg.security.max_input_length, 100_000);
        assert_eq!(cfg.pipeline.auto_threshold, 3);
        assert_eq!(cfg.metrics.capacity, 10_000);
        assert_eq!(cfg.mcp.timeout_secs, 30);
        assert_eq!(cfg.sandbox.timeout_secs, 30);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let cfg = EvolutionConfig::default();
        let sum = cfg.success_weight + cfg.quality_weight + cfg.cost_weight + cfg.speed_weight;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_toml_partial() {
        let raw = r#"
            [budget]
            daily_limit_usd = 2.5
            monthly_limit_usd = 0.0

            [pipeline]
            auto_threshold = 5
            default_quality = 0.8
            llm_timeout_secs = 60
            low_quality_threshold = 0.5
            skb_quality_threshold = 0.7
            recent_history = 4
        "#;
        let cfg = RuntimeConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.budget.daily_limit_usd, 2.5);
        assert_eq!(cfg.budget.monthly_limit_usd, 0.0);
        assert_eq!(cfg.pipeline.auto_threshold, 5);
        // Untouched sections fall back to defaults
        assert_eq!(cfg.goals.max_attempts, 3);
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(RuntimeConfig::from_toml_str("budget = 3").is_err());
    }
}
