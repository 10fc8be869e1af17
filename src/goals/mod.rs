// src/goals/mod.rs — Proactive goal queue with retry policy

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::config::GoalConfig;
use crate::infra::errors::{FlywheelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalSource {
    Reflection,
    Pattern,
    Heartbeat,
    User,
    Evolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    pub source: GoalSource,
    pub priority: GoalPriority,
    pub status: GoalStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub metadata: HashMap<String, String>,
    /// Task spawned for the current attempt, when in progress.
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Priority queue of proactive goals. The population is small enough that a
/// linear scan beats maintaining a heap.
pub struct GoalEngine {
    max_attempts: u32,
    goals: Mutex<HashMap<String, Goal>>,
}

impl GoalEngine {
    pub fn new(cfg: &GoalConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            goals: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, description: &str, source: GoalSource, priority: GoalPriority) -> Goal {
        self.add_with_metadata(description, source, priority, HashMap::new())
    }

    pub fn add_with_metadata(
        &self,
        description: &str,
        source: GoalSource,
        priority: GoalPriority,
        metadata: HashMap<String, String>,
    ) -> Goal {
        let now = Utc::now();
        let goal = Goal {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            source,
            priority,
            status: GoalStatus::Pending,
            attempts: 0,
            max_attempts: self.max_attempts,
            metadata,
            task_id: String::new(),
            created_at: now,
            updated_at: now,
        };
        let mut goals = self.goals.lock().unwrap_or_else(|e| e.into_inner());
        goals.insert(goal.id.clone(), goal.clone());
        goal
    }

    /// Highest-priority pending goal; FIFO within a priority band.
    pub fn next_pending(&self) -> Option<Goal> {
        let goals = self.goals.lock().unwrap_or_else(|e| e.into_inner());
        goals
            .values()
            .filter(|g| g.status == GoalStatus::Pending)
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            })
            .cloned()
    }

    /// Claim a goal for execution; counts one attempt.
    pub fn mark_in_progress(&self, id: &str, task_id: &str) -> Result<()> {
        self.update(id, |goal| {
            goal.status = GoalStatus::InProgress;
            goal.attempts += 1;
            goal.task_id = task_id.to_string();
        })
    }

    pub fn mark_completed(&self, id: &str) -> Result<()> {
        self.update(id, |goal| {
            goal.status = GoalStatus::Completed;
        })
    }

    /// Return the goal to the queue until its attempts run out.
    pub fn mark_failed(&self, id: &str) -> Result<()> {
        self.update(id, |goal| {
            if goal.max_attempts > 0 && goal.attempts >= goal.max_attempts {
                goal.status = GoalStatus::Failed;
            } else {
                goal.status = GoalStatus::Pending;
            }
        })
    }

    pub fn cancel(&self, id: &str) -> Result<()> {
        self.update(id, |goal| {
            goal.status = GoalStatus::Cancelled;
        })
    }

    /// Drop completed goals older than `max_age`. Returns how many were removed.
    pub fn cleanup_completed(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut goals = self.goals.lock().unwrap_or_else(|e| e.into_inner());
        let before = goals.len();
        goals.retain(|_, g| !(g.status == GoalStatus::Completed && g.updated_at < cutoff));
        before - goals.len()
    }

    pub fn get(&self, id: &str) -> Option<Goal> {
        let goals = self.goals.lock().unwrap_or_else(|e| e.into_inner());
        goals.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Goal> {
        let goals = self.goals.lock().unwrap_or_else(|e| e.into_inner());
        goals.values().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        let goals = self.goals.lock().unwrap_or_else(|e| e.into_inner());
        goals
            .values()
            .filter(|g| g.status == GoalStatus::Pending)
            .count()
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Goal)) -> Result<()> {
        let mut goals = self.goals.lock().unwrap_or_else(|e| e.into_inner());
        let goal = goals
            .get_mut(id)
            .ok_or_else(|| FlywheelError::GoalNotFound { id: id.into() })?;
        f(goal);
        goal.updated_at = Utc::now();
        Ok(())
    }
}
