// src/pipeline/mod.rs — The staged orchestration engine

pub mod prompts;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::budget::BudgetTracker;
use crate::context::{ContextAssembler, ContextLayers};
use crate::dag::{DagExecutor, SubtaskSpec, SubtaskStatus};
use crate::evolution::{EvolutionEngine, VersionController};
use crate::goals::{GoalEngine, GoalPriority, GoalSource};
use crate::infra::config::PipelineConfig;
use crate::infra::errors::{FlywheelError, Result};
use crate::memory::{LongTermEntry, LongTermMemory, SharedKnowledgeBase, ShortTermMemory, SkbEntry};
use crate::metrics::{MetricKind, MetricsCollector};
use crate::patterns::PatternTracker;
use crate::provider::router::ModelRouter;
use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, Message};
use crate::security::{
    AuditEvent, AuditKind, AuditLog, AuditSeverity, PolicyEnforcer, Sanitizer, SecretRegistry,
};
use crate::skills::{SkillInput, SkillRegistry, SkillStatus};
use crate::soul::Soul;
use crate::subagents::{DelegatedTask, SubagentManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Draft,
    Clarified,
    Planned,
    Executing,
    Reviewing,
    Completed,
    Failed,
}

/// The work item owned by the pipeline for the duration of one run.
/// `version` increases at every stage transition; `fingerprint` is set at
/// the pattern-tracking stage and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub version: u32,
    pub status: TaskStatus,
    pub goal: String,
    pub context: String,
    pub subtasks: Vec<SubtaskSpec>,
    pub budget_usd: f64,
    pub fingerprint: String,
    pub quality_score: f64,
    pub review_notes: String,
    pub source_channel: String,
    pub source_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSpec {
    fn new(goal: &str, channel: &str, user_id: &str, budget_usd: f64) -> Self {
        let now = Utc::now();
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
        Self {
            id: format!("task_{nanos}"),
            version: 1,
            status: TaskStatus::Draft,
            goal: goal.to_string(),
            context: String::new(),
            subtasks: Vec::new(),
            budget_usd,
            fingerprint: String::new(),
            quality_score: 0.0,
            review_notes: String::new(),
            source_channel: channel.to_string(),
            source_user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn advance(&mut self, status: TaskStatus) {
        self.status = status;
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// One external input to process.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    pub text: String,
    pub channel: String,
    pub user_id: String,
}

impl RunInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            channel: "cli".into(),
            user_id: String::new(),
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

/// What one run produced. `cost_usd` sums every LLM cost incurred;
/// `elapsed_ms` is wall clock from intake through post-hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub task_id: String,
    pub success: bool,
    pub result: String,
    pub quality_score: f64,
    pub cost_usd: f64,
    pub elapsed_ms: u64,
    pub fingerprint: String,
    pub automation_triggered: bool,
}

/// Optional full reflection engine. Absent, the pipeline falls back to a
/// lightweight LLM reflection.
#[async_trait]
pub trait Reflection: Send + Sync {
    async fn meso(&self, task: &TaskSpec, result: &str) -> Result<String>;
    fn should_run_macro(&self) -> bool;
    async fn run_macro(&self) -> Result<String>;
}

/// Everything the pipeline consumes, wired by the composition root. There
/// is no process-wide state; two pipelines with separate bundles are fully
/// independent.
pub struct Dependencies {
    pub agent_id: String,
    pub llm: Arc<dyn LlmProvider>,
    pub router: ModelRouter,
    pub budget: Arc<BudgetTracker>,
    pub skills: Arc<SkillRegistry>,
    pub patterns: Arc<PatternTracker>,
    pub evolution: Arc<EvolutionEngine>,
    pub versions: Arc<VersionController>,
    pub goals: Arc<GoalEngine>,
    pub subagents: Option<Arc<SubagentManager>>,
    pub metrics: Arc<MetricsCollector>,
    pub audit: Arc<AuditLog>,
    pub sanitizer: Arc<Sanitizer>,
    pub policy: Arc<PolicyEnforcer>,
    pub secrets: Option<Arc<SecretRegistry>>,
    pub soul: Arc<dyn Soul>,
    pub context: Arc<dyn ContextAssembler>,
    pub short_term: Arc<dyn ShortTermMemory>,
    pub long_term: Arc<dyn LongTermMemory>,
    pub skb: Option<Arc<dyn SharedKnowledgeBase>>,
    pub reflection: Option<Arc<dyn Reflection>>,
    pub config: PipelineConfig,
}

/// Drives one input through clarify → plan → select → execute → review →
/// memory → patterns → reflect → goals, with evolution and version-control
/// post-hooks. Synchronous per input: the pipeline owns the TaskSpec for
/// the whole run.
pub struct Pipeline {
    deps: Dependencies,
}

impl Pipeline {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    pub async fn run(&self, input: RunInput) -> RunResult {
        let started = Instant::now();
        let total_cost = Mutex::new(0.0f64);
        let skills_used: Mutex<Vec<String>> = Mutex::new(Vec::new());

        // Pre-stage: sanitize. A block is terminal and costs nothing.
        let outcome = self.deps.sanitizer.sanitize(&input.text);
        if outcome.blocked {
            self.deps.audit.append(
                AuditEvent::new(AuditKind::InputBlocked, AuditSeverity::Warn, "sanitize")
                    .agent(&self.deps.agent_id)
                    .actor(&input.user_id)
                    .detail(&outcome.reason),
            );
            return RunResult {
                task_id: String::new(),
                success: false,
                result: format!("input blocked: {}", outcome.reason),
                quality_score: 0.0,
                cost_usd: 0.0,
                elapsed_ms: started.elapsed().as_millis() as u64,
                fingerprint: String::new(),
                automation_triggered: false,
            };
        }
        for warning in &outcome.warnings {
            tracing::warn!("{}", warning);
            self.deps.audit.append(
                AuditEvent::new(AuditKind::InjectionWarning, AuditSeverity::Warn, "sanitize")
                    .agent(&self.deps.agent_id)
                    .actor(&input.user_id)
                    .detail(warning),
            );
        }

        // Intake.
        let mut task = TaskSpec::new(
            &outcome.text,
            &input.channel,
            &input.user_id,
            self.deps.budget.effective_budget(),
        );
        self.deps.audit.append(
            AuditEvent::new(AuditKind::TaskStarted, AuditSeverity::Info, "intake")
                .agent(&self.deps.agent_id)
                .resource(&task.id),
        );

        // Clarify.
        let task_id = task.id.clone();
        let soul_text = self.deps.soul.read();
        let clarify_messages = vec![
            Message::system(format!("{soul_text}\n\n{}", prompts::CLARIFY_INSTRUCTION)),
            Message::user(task.goal.clone()),
        ];
        let clarified = self
            .llm_call(clarify_messages, "simple", &task_id, &total_cost)
            .await;
        match clarified {
            Ok(response) => {
                task.context = response.content;
                task.advance(TaskStatus::Clarified);
            }
            Err(e) => return self.fail(&mut task, started, &total_cost, e, "clarify"),
        }

        // Plan. The response informs the work order but parsing into
        // multiple subtasks is deliberately not attempted; planning yields
        // one synthetic subtask.
        let plan_messages = vec![
            Message::system(format!("{soul_text}\n\n{}", prompts::PLAN_INSTRUCTION)),
            Message::user(format!("{}\n\n{}", task.goal, task.context)),
        ];
        let planned = self
            .llm_call(plan_messages, "moderate", &task_id, &total_cost)
            .await;
        match planned {
            Ok(_) => {
                task.subtasks = vec![SubtaskSpec::new(
                    format!("{task_id}_sub1"),
                    task.goal.clone(),
                )];
                task.advance(TaskStatus::Planned);
            }
            Err(e) => return self.fail(&mut task, started, &total_cost, e, "plan"),
        }

        // Agent selection: a proven skill beats a planner hint beats self.
        let fingerprint =
            PatternTracker::compute_fingerprint(&task.goal, &task.source_channel);
        for subtask in &mut task.subtasks {
            if let Some(skill) = self.deps.skills.find_active(&fingerprint) {
                subtask.assigned_to = format!("skill:{}", skill.meta.id);
            } else if subtask.assigned_to.starts_with("agent:") {
                // Keep the planner's delegation hint.
            } else {
                subtask.assigned_to = "self".into();
            }
        }

        // Execute. Budget and policy gate the stage; a run slot is held for
        // the duration of subtask execution.
        if !self.deps.budget.can_spend(0.01) {
            self.deps.audit.append(
                AuditEvent::new(AuditKind::BudgetRejected, AuditSeverity::Warn, "execute")
                    .agent(&self.deps.agent_id)
                    .resource(&task.id),
            );
            let remaining = self.deps.budget.effective_budget();
            return self.fail(
                &mut task,
                started,
                &total_cost,
                FlywheelError::BudgetExhausted {
                    needed: 0.01,
                    remaining,
                },
                "execute",
            );
        }
        let decision = self.deps.policy.check(&self.deps.agent_id, None);
        if let Some(violation) = decision.violation {
            self.deps.audit.append(
                AuditEvent::new(AuditKind::PolicyViolation, AuditSeverity::Warn, "execute")
                    .agent(&self.deps.agent_id)
                    .resource(&task.id)
                    .detail(violation.to_string()),
            );
            return self.fail(
                &mut task,
                started,
                &total_cost,
                FlywheelError::Validation(format!("policy violation: {violation}")),
                "execute",
            );
        }
        task.advance(TaskStatus::Executing);

        self.deps.policy.acquire_run(&self.deps.agent_id);
        let executed: Result<String> = if task.subtasks.len() == 1 {
            let spec = task.subtasks[0].clone();
            let outcome = self
                .execute_subtask(spec, &task, &total_cost, &skills_used)
                .await;
            match outcome {
                Ok(text) => {
                    task.subtasks[0].status = SubtaskStatus::Completed;
                    task.subtasks[0].result = text.clone();
                    Ok(text)
                }
                Err(e) => Err(e),
            }
        } else {
            let mut subtasks = std::mem::take(&mut task.subtasks);
            let task_view = task.clone();
            let (_records, error) = DagExecutor::new()
                .execute(&mut subtasks, |spec| {
                    self.execute_subtask(spec, &task_view, &total_cost, &skills_used)
                })
                .await;
            task.subtasks = subtasks;
            match error {
                Some(e) => Err(e),
                None => Ok(task
                    .subtasks
                    .iter()
                    .map(|s| s.result.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n")),
            }
        };
        self.deps.policy.release_run(&self.deps.agent_id);

        let result = match executed {
            Ok(result) => result,
            Err(e) => return self.fail(&mut task, started, &total_cost, e, "execute"),
        };

        // Review.
        let review_messages = vec![
            Message::system(prompts::REVIEW_INSTRUCTION.to_string()),
            Message::user(format!("Goal:\n{}\n\nResult:\n{}", task.goal, result)),
        ];
        let reviewed = self
            .llm_call(review_messages, "simple", &task_id, &total_cost)
            .await;
        let quality = match reviewed {
            Ok(response) => {
                let (quality, notes) =
                    prompts::parse_review(&response.content, self.deps.config.default_quality);
                task.quality_score = quality;
                task.review_notes = notes;
                task.advance(TaskStatus::Reviewing);
                quality
            }
            Err(e) => return self.fail(&mut task, started, &total_cost, e, "review"),
        };

        // Memory update. Non-fatal: a memory write failure costs recall,
        // not the run.
        let mut meta = HashMap::new();
        meta.insert("task_id".to_string(), task.id.clone());
        meta.insert("channel".to_string(), task.source_channel.clone());
        if let Err(e) = self.deps.short_term.add("user", &task.goal, meta.clone()).await {
            tracing::warn!("short-term memory write failed: {}", e);
        }
        if let Err(e) = self.deps.short_term.add("assistant", &result, meta).await {
            tracing::warn!("short-term memory write failed: {}", e);
        }
        let summary = format!(
            "Task: {}\nQuality: {:.2}\nResult: {}",
            task.goal,
            quality,
            truncate(&result, 500)
        );
        if let Err(e) = self
            .deps
            .long_term
            .store(LongTermEntry::new(summary).tag("summary").quality(quality))
            .await
        {
            tracing::warn!("long-term memory write failed: {}", e);
        }

        // Pattern tracking.
        task.fingerprint = fingerprint.clone();
        let entry = self
            .deps
            .patterns
            .record(&fingerprint, &task.goal, quality)
            .await;
        let automatable =
            entry.count >= self.deps.patterns.auto_threshold() && entry.skill_id.is_empty();

        // Reflection. Errors are logged and swallowed.
        self.reflect(&task, &result, &total_cost).await;

        // Goal updates.
        if automatable {
            let mut goal_meta = HashMap::new();
            goal_meta.insert("fingerprint".to_string(), fingerprint.clone());
            goal_meta.insert("goal".to_string(), task.goal.clone());
            goal_meta.insert("channel".to_string(), task.source_channel.clone());
            self.deps.goals.add_with_metadata(
                &format!("Generate code-skill for pattern {fingerprint}"),
                GoalSource::Pattern,
                GoalPriority::High,
                goal_meta,
            );
        }
        if quality < self.deps.config.low_quality_threshold {
            self.deps.goals.add(
                &format!(
                    "Investigate low-quality result ({:.2}) for task {}",
                    quality, task.id
                ),
                GoalSource::Reflection,
                GoalPriority::Normal,
            );
        }

        task.advance(TaskStatus::Completed);
        let cost = *total_cost.lock().unwrap_or_else(|e| e.into_inner());
        let used = skills_used.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.post_hooks(&task, &used, quality, cost);

        self.deps.audit.append(
            AuditEvent::new(AuditKind::TaskCompleted, AuditSeverity::Info, "complete")
                .agent(&self.deps.agent_id)
                .resource(&task.id)
                .detail(format!("quality {quality:.2}")),
        );

        // Outgoing text never carries known secrets.
        let result = match &self.deps.secrets {
            Some(secrets) => secrets.sanitize(&result),
            None => result,
        };

        RunResult {
            task_id: task.id.clone(),
            success: true,
            result,
            quality_score: quality,
            cost_usd: cost,
            elapsed_ms: started.elapsed().as_millis() as u64,
            fingerprint,
            automation_triggered: automatable,
        }
    }

    /// Resolution order per subtask: assigned skill → subagent → LLM.
    /// Skill and subagent failures downgrade with an audit trail instead of
    /// failing the task.
    async fn execute_subtask(
        &self,
        subtask: SubtaskSpec,
        task: &TaskSpec,
        total_cost: &Mutex<f64>,
        skills_used: &Mutex<Vec<String>>,
    ) -> Result<String> {
        if let Some(skill_id) = subtask.assigned_to.strip_prefix("skill:") {
            if let Some(skill) = self.deps.skills.get(skill_id) {
                let input = SkillInput {
                    task_id: task.id.clone(),
                    goal: subtask.goal.clone(),
                    context: task.context.clone(),
                };
                let output = skill.executor.execute(&input).await;
                if let Err(e) = self.deps.skills.record_run(skill_id, &output) {
                    tracing::warn!("skill stats update failed: {}", e);
                }
                self.record_ab_runs(skill_id);

                if output.success {
                    self.charge(&task.id, output.cost_usd, total_cost);
                    if let Some(meta) = self.deps.skills.get_meta(skill_id) {
                        self.deps.metrics.record_labeled(
                            MetricKind::SkillFitness,
                            self.deps.evolution.fitness(&meta),
                            "skill_id",
                            skill_id,
                        );
                    }
                    skills_used
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(skill_id.to_string());
                    self.deps.audit.append(
                        AuditEvent::new(AuditKind::SkillExecuted, AuditSeverity::Info, "execute")
                            .agent(&self.deps.agent_id)
                            .resource(format!("skill:{skill_id}")),
                    );
                    return Ok(output.result);
                }

                let reason = output.error.unwrap_or_else(|| "unknown".into());
                tracing::warn!("skill '{}' failed, falling back: {}", skill_id, reason);
                self.deps.audit.append(
                    AuditEvent::new(AuditKind::SkillFallback, AuditSeverity::Warn, "execute")
                        .agent(&self.deps.agent_id)
                        .resource(format!("skill:{skill_id}"))
                        .failed(reason),
                );
            }
        }

        if let Some(child_id) = subtask.assigned_to.strip_prefix("agent:") {
            if let Some(subagents) = &self.deps.subagents {
                let delegated = DelegatedTask {
                    description: subtask.goal.clone(),
                    context: task.context.clone(),
                };
                match subagents
                    .delegate(&self.deps.agent_id, child_id, &delegated)
                    .await
                {
                    Ok(result) if result.success => {
                        self.charge(&task.id, result.cost_usd, total_cost);
                        return Ok(result.result);
                    }
                    Ok(result) => {
                        tracing::warn!(
                            "subagent '{}' unsuccessful, falling back: {:?}",
                            child_id,
                            result.error
                        );
                    }
                    Err(e) => {
                        tracing::warn!("subagent '{}' failed, falling back: {}", child_id, e);
                    }
                }
            }
        }

        // LLM fallback: assembled context with persona and recent history.
        let recent = self
            .deps
            .short_term
            .get_recent(self.deps.config.recent_history)
            .await
            .unwrap_or_default();
        let history: Vec<Message> = recent
            .iter()
            .map(|m| match m.role.as_str() {
                "assistant" => Message::assistant(m.content.clone()),
                _ => Message::user(m.content.clone()),
            })
            .collect();

        let layers = ContextLayers {
            system_prompt: self.deps.soul.read(),
            task_description: if task.context.is_empty() {
                subtask.goal.clone()
            } else {
                format!("{}\n\nWork order:\n{}", subtask.goal, task.context)
            },
            recent_history: history,
            ..Default::default()
        };
        let messages = self.deps.context.assemble(&layers);
        let response = self.llm_call(messages, "moderate", &task.id, total_cost).await?;
        Ok(response.content)
    }

    async fn llm_call(
        &self,
        messages: Vec<Message>,
        complexity: &str,
        task_id: &str,
        total_cost: &Mutex<f64>,
    ) -> Result<CompletionResponse> {
        let model = self
            .deps
            .router
            .select(complexity, self.deps.budget.effective_budget());
        let request = CompletionRequest {
            messages,
            model: if model.is_empty() { None } else { Some(model) },
            ..Default::default()
        };

        let timeout = Duration::from_secs(self.deps.config.llm_timeout_secs);
        let response = tokio::time::timeout(timeout, self.deps.llm.complete(request))
            .await
            .map_err(|_| {
                FlywheelError::Cancelled(format!(
                    "LLM call timed out after {}s",
                    self.deps.config.llm_timeout_secs
                ))
            })??;

        self.charge(task_id, response.cost_usd, total_cost);
        self.deps.metrics.increment("llm_calls");
        self.deps
            .metrics
            .record_labeled(MetricKind::LlmCalls, 1.0, "model", &response.model);
        Ok(response)
    }

    fn charge(&self, task_id: &str, cost: f64, total_cost: &Mutex<f64>) {
        if cost > 0.0 {
            self.deps.budget.record(task_id, cost);
        }
        *total_cost.lock().unwrap_or_else(|e| e.into_inner()) += cost;
    }

    /// Credit this run to any open A/B test the skill participates in.
    fn record_ab_runs(&self, skill_id: &str) {
        for test in self.deps.evolution.list_tests() {
            if !test.decided && (test.incumbent_id == skill_id || test.challenger_id == skill_id) {
                if let Err(e) = self.deps.evolution.record_run(&test.id, skill_id) {
                    tracing::warn!("A/B run record failed: {}", e);
                }
            }
        }
    }

    async fn reflect(&self, task: &TaskSpec, result: &str, total_cost: &Mutex<f64>) {
        if let Some(reflection) = &self.deps.reflection {
            match reflection.meso(task, result).await {
                Ok(text) => {
                    if let Err(e) = self
                        .deps
                        .long_term
                        .store(LongTermEntry::new(text).tag("reflection/meso"))
                        .await
                    {
                        tracing::warn!("reflection store failed: {}", e);
                    }
                }
                Err(e) => tracing::warn!("meso-reflection failed: {}", e),
            }
            if reflection.should_run_macro() {
                if let Err(e) = reflection.run_macro().await {
                    tracing::warn!("macro-reflection failed: {}", e);
                }
            }
            return;
        }

        // Lightweight fallback reflection.
        let messages = vec![
            Message::system(prompts::REFLECT_INSTRUCTION.to_string()),
            Message::user(format!(
                "Task: {}\nQuality: {:.2}\nResult: {}",
                task.goal,
                task.quality_score,
                truncate(result, 500)
            )),
        ];
        match self.llm_call(messages, "simple", &task.id, total_cost).await {
            Ok(response) => {
                if let Err(e) = self
                    .deps
                    .long_term
                    .store(LongTermEntry::new(response.content).tag("reflection/meso"))
                    .await
                {
                    tracing::warn!("reflection store failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("lightweight reflection failed: {}", e),
        }
    }

    /// Evolution, version-control, SKB, and metric updates after a
    /// successful run. All non-fatal.
    fn post_hooks(&self, task: &TaskSpec, skills_used: &[String], quality: f64, cost: f64) {
        let decided = self.deps.evolution.evaluate_open_tests(&self.deps.skills);
        if !decided.is_empty() {
            tracing::info!("decided {} A/B test(s)", decided.len());
        }

        for id in self.deps.evolution.evaluate_all(&self.deps.skills) {
            tracing::info!("deprecating unfit skill '{}'", id);
            if let Err(e) = self.deps.skills.update_status(&id, SkillStatus::Deprecated) {
                tracing::warn!("deprecation failed: {}", e);
            }
        }

        for skill_id in skills_used {
            if let Err(e) = self.deps.skills.record_quality(skill_id, quality) {
                tracing::warn!("skill quality update failed: {}", e);
            }
        }

        // Observe this run against every entity that shaped it: the soul
        // always, plus any skills that executed.
        let mut entities: Vec<String> = vec!["soul".to_string()];
        entities.extend(skills_used.iter().cloned());
        for entity in entities {
            for change in self.deps.versions.observe_run(&entity, quality, cost) {
                tracing::warn!(
                    "rolled back change '{}' on '{}' ({})",
                    change.id,
                    change.entity_id,
                    change.description
                );
                self.deps.audit.append(
                    AuditEvent::new(AuditKind::Rollback, AuditSeverity::Warn, "observe_run")
                        .agent(&self.deps.agent_id)
                        .resource(&change.entity_id)
                        .detail(&change.description),
                );
            }
        }

        if quality >= self.deps.config.skb_quality_threshold {
            if let Some(skb) = &self.deps.skb {
                let entry = SkbEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    content: format!("{} → quality {:.2}", task.goal, quality),
                    fitness: quality,
                    source_agent: self.deps.agent_id.clone(),
                    tags: vec![task.source_channel.clone()],
                    timestamp: Utc::now(),
                };
                let skb = skb.clone();
                tokio::spawn(async move {
                    if let Err(e) = skb.store(entry).await {
                        tracing::warn!("SKB store failed: {}", e);
                    }
                });
            }
        }

        self.deps
            .metrics
            .record_labeled(MetricKind::TaskQuality, quality, "task_id", &task.id);
        self.deps
            .metrics
            .record_labeled(MetricKind::TaskCost, cost, "task_id", &task.id);
        let latency = (Utc::now() - task.created_at).num_milliseconds().max(0) as f64;
        self.deps
            .metrics
            .record_labeled(MetricKind::TaskLatency, latency, "task_id", &task.id);
    }

    fn fail(
        &self,
        task: &mut TaskSpec,
        started: Instant,
        total_cost: &Mutex<f64>,
        error: FlywheelError,
        stage: &str,
    ) -> RunResult {
        tracing::error!("pipeline failed at {}: {}", stage, error);
        self.deps.metrics.increment("errors");
        self.deps
            .metrics
            .record_labeled(MetricKind::Errors, 1.0, "stage", stage);
        self.deps.audit.append(
            AuditEvent::new(AuditKind::TaskFailed, AuditSeverity::Error, stage)
                .agent(&self.deps.agent_id)
                .resource(&task.id)
                .failed(error.to_string()),
        );
        task.advance(TaskStatus::Failed);

        RunResult {
            task_id: task.id.clone(),
            success: false,
            result: error.to_string(),
            quality_score: 0.0,
            cost_usd: *total_cost.lock().unwrap_or_else(|e| e.into_inner()),
            elapsed_ms: started.elapsed().as_millis() as u64,
            fingerprint: task.fingerprint.clone(),
            automation_triggered: false,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}
