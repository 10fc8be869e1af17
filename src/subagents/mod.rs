// src/subagents/mod.rs — Delegation to child agents

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::config::SubagentConfig;
use crate::infra::errors::{FlywheelError, Result};

/// Work handed to a child agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedTask {
    pub description: String,
    pub context: String,
}

impl DelegatedTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            context: String::new(),
        }
    }
}

/// Outcome reported by a child agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationResult {
    pub success: bool,
    pub result: String,
    pub quality: f64,
    pub cost_usd: f64,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Runs a task on a child agent. The concrete runner (in-process agent,
/// remote call) lives outside this crate.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, agent_id: &str, task: &DelegatedTask) -> Result<DelegationResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl DelegationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DelegationStatus::Completed | DelegationStatus::Failed | DelegationStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationStatus::Pending => "pending",
            DelegationStatus::Running => "running",
            DelegationStatus::Completed => "completed",
            DelegationStatus::Failed => "failed",
            DelegationStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub id: String,
    pub parent_agent_id: String,
    pub child_agent_id: String,
    pub task: DelegatedTask,
    pub status: DelegationStatus,
    pub result: Option<DelegationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tracks delegations to child agents and fans work out across them.
pub struct SubagentManager {
    runner: Arc<dyn TaskRunner>,
    task_timeout: Option<Duration>,
    delegations: Mutex<HashMap<String, Delegation>>,
}

impl SubagentManager {
    pub fn new(runner: Arc<dyn TaskRunner>, cfg: &SubagentConfig) -> Self {
        Self {
            runner,
            task_timeout: cfg.task_timeout_secs.map(Duration::from_secs),
            delegations: Mutex::new(HashMap::new()),
        }
    }

    /// Delegate synchronously. The delegation record tracks the outcome; on
    /// error the record is failed with the elapsed time and the error is
    /// returned to the caller.
    pub async fn delegate(
        &self,
        parent: &str,
        child: &str,
        task: &DelegatedTask,
    ) -> Result<DelegationResult> {
        let id = self.insert(parent, child, task, DelegationStatus::Running);
        self.run_delegation(&id, child, task).await
    }

    /// Create a pending delegation to be run later via [`execute`].
    pub fn delegate_async(&self, parent: &str, child: &str, task: &DelegatedTask) -> String {
        self.insert(parent, child, task, DelegationStatus::Pending)
    }

    /// Run a previously created delegation: pending → running → terminal.
    pub async fn execute(&self, delegation_id: &str) -> Result<DelegationResult> {
        let (child, task) = {
            let mut delegations = self.delegations.lock().unwrap_or_else(|e| e.into_inner());
            let delegation = delegations.get_mut(delegation_id).ok_or_else(|| {
                FlywheelError::DelegationNotFound {
                    id: delegation_id.into(),
                }
            })?;
            if delegation.status != DelegationStatus::Pending {
                return Err(FlywheelError::DelegationState {
                    id: delegation_id.into(),
                    status: delegation.status.as_str().into(),
                    expected: "pending".into(),
                });
            }
            delegation.status = DelegationStatus::Running;
            delegation.updated_at = Utc::now();
            (delegation.child_agent_id.clone(), delegation.task.clone())
        };
        self.run_delegation(delegation_id, &child, &task).await
    }

    /// Run `task` on every child concurrently; results are positional. One
    /// arm failing does not cancel the others.
    pub async fn fan_out(
        &self,
        parent: &str,
        children: &[String],
        task: &DelegatedTask,
    ) -> Vec<Result<DelegationResult>> {
        let arms = children.iter().map(|child| self.delegate(parent, child, task));
        join_all(arms).await
    }

    /// Fan out and keep the best: the successful result with the highest
    /// quality. If nothing succeeded, the first failure result is returned
    /// so callers still see diagnostics; if every arm errored outright, the
    /// first error propagates.
    pub async fn best_of_n(
        &self,
        parent: &str,
        children: &[String],
        task: &DelegatedTask,
    ) -> Result<DelegationResult> {
        let mut outcomes = self.fan_out(parent, children, task).await;

        let mut best: Option<DelegationResult> = None;
        let mut first_failure: Option<DelegationResult> = None;
        let mut first_error: Option<FlywheelError> = None;

        for outcome in outcomes.drain(..) {
            match outcome {
                Ok(result) if result.success => {
                    if best
                        .as_ref()
                        .map(|b| result.quality > b.quality)
                        .unwrap_or(true)
                    {
                        best = Some(result);
                    }
                }
                Ok(result) => {
                    if first_failure.is_none() {
                        first_failure = Some(result);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(best) = best {
            return Ok(best);
        }
        if let Some(failure) = first_failure {
            return Ok(failure);
        }
        Err(first_error.unwrap_or_else(|| {
            FlywheelError::Validation("best_of_n called with no children".into())
        }))
    }

    /// Only pending delegations can be cancelled.
    pub fn cancel(&self, delegation_id: &str) -> Result<()> {
        let mut delegations = self.delegations.lock().unwrap_or_else(|e| e.into_inner());
        let delegation = delegations.get_mut(delegation_id).ok_or_else(|| {
            FlywheelError::DelegationNotFound {
                id: delegation_id.into(),
            }
        })?;
        if delegation.status != DelegationStatus::Pending {
            return Err(FlywheelError::DelegationState {
                id: delegation_id.into(),
                status: delegation.status.as_str().into(),
                expected: "pending".into(),
            });
        }
        delegation.status = DelegationStatus::Cancelled;
        delegation.updated_at = Utc::now();
        Ok(())
    }

    /// Remove terminal delegations older than the cutoff. Returns how many
    /// were removed.
    pub fn cleanup(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut delegations = self.delegations.lock().unwrap_or_else(|e| e.into_inner());
        let before = delegations.len();
        delegations.retain(|_, d| !(d.status.is_terminal() && d.updated_at < cutoff));
        before - delegations.len()
    }

    pub fn get(&self, delegation_id: &str) -> Option<Delegation> {
        let delegations = self.delegations.lock().unwrap_or_else(|e| e.into_inner());
        delegations.get(delegation_id).cloned()
    }

    pub fn list(&self) -> Vec<Delegation> {
        let delegations = self.delegations.lock().unwrap_or_else(|e| e.into_inner());
        delegations.values().cloned().collect()
    }

    fn insert(
        &self,
        parent: &str,
        child: &str,
        task: &DelegatedTask,
        status: DelegationStatus,
    ) -> String {
        let now = Utc::now();
        let delegation = Delegation {
            id: Uuid::new_v4().to_string(),
            parent_agent_id: parent.to_string(),
            child_agent_id: child.to_string(),
            task: task.clone(),
            status,
            result: None,
            created_at: now,
            updated_at: now,
        };
        let id = delegation.id.clone();
        let mut delegations = self.delegations.lock().unwrap_or_else(|e| e.into_inner());
        delegations.insert(id.clone(), delegation);
        id
    }

    async fn run_delegation(
        &self,
        delegation_id: &str,
        child: &str,
        task: &DelegatedTask,
    ) -> Result<DelegationResult> {
        let started = Instant::now();
        let outcome = match self.task_timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.runner.run_task(child, task)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FlywheelError::Cancelled(format!(
                        "delegation to '{child}' timed out after {timeout:?}"
                    ))),
                }
            }
            None => self.runner.run_task(child, task).await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut result) => {
                if result.elapsed_ms == 0 {
                    result.elapsed_ms = elapsed_ms;
                }
                let status = if result.success {
                    DelegationStatus::Completed
                } else {
                    DelegationStatus::Failed
                };
                self.finish(delegation_id, status, Some(result.clone()));
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("delegation to '{}' failed: {}", child, e);
                self.finish(
                    delegation_id,
                    DelegationStatus::Failed,
                    Some(DelegationResult {
                        success: false,
                        elapsed_ms,
                        error: Some(e.to_string()),
                        ..Default::default()
                    }),
                );
                Err(e)
            }
        }
    }

    fn finish(&self, delegation_id: &str, status: DelegationStatus, result: Option<DelegationResult>) {
        let mut delegations = self.delegations.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delegation) = delegations.get_mut(delegation_id) {
            delegation.status = status;
            delegation.result = result;
            delegation.updated_at = Utc::now();
        }
    }
}
