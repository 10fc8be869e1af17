// src/dag/mod.rs — Wave-ordered subtask execution

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::infra::errors::{FlywheelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One unit of planned work. `depends_on` names sibling subtasks that must
/// complete first; the graph must be acyclic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub id: String,
    pub goal: String,
    pub depends_on: Vec<String>,
    /// "self", "skill:<id>", or "agent:<id>".
    pub assigned_to: String,
    pub status: SubtaskStatus,
    pub result: String,
    pub quality_score: f64,
}

impl SubtaskSpec {
    pub fn new(id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            depends_on: Vec::new(),
            assigned_to: "self".into(),
            status: SubtaskStatus::Pending,
            result: String::new(),
            quality_score: 0.0,
        }
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Execution record for one subtask, used to verify ordering guarantees.
#[derive(Debug, Clone)]
pub struct SubtaskRecord {
    pub id: String,
    pub started_at: Instant,
    pub completed_at: Instant,
    pub success: bool,
}

/// Executes a subtask graph in waves: everything whose dependencies are
/// satisfied runs concurrently, then a barrier, then the next wave. The
/// first error stops scheduling after its wave and is returned alongside
/// the partial records.
#[derive(Debug, Clone, Copy, Default)]
pub struct DagExecutor;

impl DagExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute<F, Fut>(
        &self,
        subtasks: &mut [SubtaskSpec],
        run: F,
    ) -> (Vec<SubtaskRecord>, Option<FlywheelError>)
    where
        F: Fn(SubtaskSpec) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let mut records = Vec::new();
        let mut first_error: Option<FlywheelError> = None;

        loop {
            let ready = ready_indices(subtasks);
            if ready.is_empty() {
                break;
            }

            for &i in &ready {
                subtasks[i].status = SubtaskStatus::Running;
            }

            let wave = ready.iter().map(|&i| {
                let spec = subtasks[i].clone();
                let run = &run;
                async move {
                    let started_at = Instant::now();
                    let outcome = run(spec).await;
                    (i, started_at, Instant::now(), outcome)
                }
            });

            // Barrier: the whole wave completes before ready is recomputed.
            for (i, started_at, completed_at, outcome) in join_all(wave).await {
                match outcome {
                    Ok(result) => {
                        subtasks[i].status = SubtaskStatus::Completed;
                        subtasks[i].result = result;
                        records.push(SubtaskRecord {
                            id: subtasks[i].id.clone(),
                            started_at,
                            completed_at,
                            success: true,
                        });
                    }
                    Err(e) => {
                        tracing::warn!("subtask '{}' failed: {}", subtasks[i].id, e);
                        subtasks[i].status = SubtaskStatus::Failed;
                        records.push(SubtaskRecord {
                            id: subtasks[i].id.clone(),
                            started_at,
                            completed_at,
                            success: false,
                        });
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            if first_error.is_some() {
                break;
            }
        }

        // Ready ran dry with work left over: a cycle or an unknown
        // dependency. Failed-upstream cases already set first_error above.
        if first_error.is_none() {
            let stranded = subtasks
                .iter()
                .filter(|s| s.status == SubtaskStatus::Pending)
                .count();
            if stranded > 0 {
                first_error = Some(FlywheelError::Validation(format!(
                    "{stranded} subtask(s) never became ready (cycle or unknown dependency)"
                )));
            }
        }

        (records, first_error)
    }
}

fn ready_indices(subtasks: &[SubtaskSpec]) -> Vec<usize> {
    let completed: Vec<&str> = subtasks
        .iter()
        .filter(|s| s.status == SubtaskStatus::Completed)
        .map(|s| s.id.as_str())
        .collect();

    subtasks
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            s.status == SubtaskStatus::Pending
                && s.depends_on.iter().all(|d| completed.contains(&d.as_str()))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Kahn's algorithm. Errors on dependencies that name no sibling and on
/// cycles.
pub fn topological_order(subtasks: &[SubtaskSpec]) -> Result<Vec<String>> {
    let ids: Vec<&str> = subtasks.iter().map(|s| s.id.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for subtask in subtasks {
        for dep in &subtask.depends_on {
            if !in_degree.contains_key(dep.as_str()) {
                return Err(FlywheelError::Validation(format!(
                    "subtask '{}' depends on unknown sibling '{}'",
                    subtask.id, dep
                )));
            }
            *in_degree.entry(subtask.id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(&subtask.id);
        }
    }

    let mut queue: VecDeque<&str> = ids
        .iter()
        .filter(|id| in_degree.get(*id).copied().unwrap_or(0) == 0)
        .copied()
        .collect();
    let mut order = Vec::new();

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for dependent in dependents.get(id).cloned().unwrap_or_default() {
            let degree = in_degree.entry(dependent).or_insert(0);
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != subtasks.len() {
        return Err(FlywheelError::CycleDetected);
    }
    Ok(order)
}
