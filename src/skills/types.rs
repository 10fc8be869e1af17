// src/skills/types.rs — Skill domain types

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a skill does its work. The whole point of the flywheel is for
/// deterministic code to displace LLM calls, so CODE outranks HYBRID
/// outranks LLM during selection, regardless of success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SkillKind {
    Llm,
    Code,
    Hybrid,
}

impl SkillKind {
    pub fn priority(&self) -> u8 {
        match self {
            SkillKind::Code => 3,
            SkillKind::Hybrid => 2,
            SkillKind::Llm => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Active,
    Challenger,
    Trial,
    Deprecated,
}

/// Descriptive and statistical state of a skill. The running averages use
/// the decay-free formula `new = (old*n + sample)/(n+1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMeta {
    pub id: String,
    pub name: String,
    pub kind: SkillKind,
    pub status: SkillStatus,
    pub fingerprint: String,
    pub version: u32,
    pub total_runs: u64,
    pub success_rate: f64,
    pub avg_quality: f64,
    pub avg_cost_usd: f64,
    pub avg_elapsed_ms: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SkillMeta {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: SkillKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            status: SkillStatus::Active,
            fingerprint: String::new(),
            version: 1,
            total_runs: 0,
            success_rate: 0.0,
            avg_quality: 0.0,
            avg_cost_usd: 0.0,
            avg_elapsed_ms: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn with_status(mut self, status: SkillStatus) -> Self {
        self.status = status;
        self
    }

    /// Fold one run's outcome into the running averages.
    pub fn record_output(&mut self, output: &SkillOutput) {
        let n = self.total_runs as f64;
        let success = if output.success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * n + success) / (n + 1.0);
        self.avg_cost_usd = (self.avg_cost_usd * n + output.cost_usd) / (n + 1.0);
        self.avg_elapsed_ms = (self.avg_elapsed_ms * n + output.elapsed_ms as f64) / (n + 1.0);
        self.total_runs += 1;
        self.updated_at = Utc::now();
    }

    /// Fold a post-review quality score into the running average. Quality
    /// arrives after execution, so it is tracked separately from
    /// [`record_output`] and does not advance `total_runs`.
    pub fn record_quality(&mut self, quality: f64) {
        let n = self.total_runs.max(1) as f64;
        self.avg_quality = (self.avg_quality * (n - 1.0) + quality) / n;
        self.updated_at = Utc::now();
    }
}

/// Input handed to a skill executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInput {
    pub task_id: String,
    pub goal: String,
    pub context: String,
}

/// Outcome of one skill execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillOutput {
    pub success: bool,
    pub result: String,
    pub cost_usd: f64,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl SkillOutput {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// The executable half of a skill. Implementations must not panic; failures
/// are reported through `SkillOutput::success` / `error`.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(&self, input: &SkillInput) -> SkillOutput;
}

/// A registered skill: metadata plus its executor.
#[derive(Clone)]
pub struct Skill {
    pub meta: SkillMeta,
    pub executor: Arc<dyn SkillExecutor>,
}

impl Skill {
    pub fn new(meta: SkillMeta, executor: Arc<dyn SkillExecutor>) -> Self {
        Self { meta, executor }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }
}

impl std::fmt::Debug for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skill").field("meta", &self.meta).finish()
    }
}
