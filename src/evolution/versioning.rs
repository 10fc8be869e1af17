// src/evolution/versioning.rs — Observation windows and auto-rollback

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::config::VersioningConfig;
use crate::infra::errors::{FlywheelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Soul,
    Skill,
    Policy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Observing,
    Accepted,
    RolledBack,
}

/// A recorded mutation under observation. While `observing`, completed runs
/// against the entity feed `current_quality`; once the window fills, the
/// change is accepted or rolled back against the baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub change_type: ChangeType,
    pub entity_id: String,
    pub description: String,
    pub status: ChangeStatus,
    pub baseline_quality: f64,
    pub baseline_cost: f64,
    pub current_quality: f64,
    pub current_cost: f64,
    pub window_size: u64,
    pub runs_observed: u64,
    pub threshold: f64,
    /// Opaque payload the caller uses to restore the previous state.
    pub rollback_data: String,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Guards every soul/skill/policy mutation with an observation window and
/// rolls back the ones that degrade quality.
pub struct VersionController {
    window_size: u64,
    threshold: f64,
    changes: Mutex<HashMap<String, Change>>,
}

impl VersionController {
    pub fn new(cfg: &VersioningConfig) -> Self {
        Self {
            window_size: cfg.window_size,
            threshold: cfg.rollback_threshold,
            changes: Mutex::new(HashMap::new()),
        }
    }

    /// Open an observation window for a just-applied mutation.
    #[allow(clippy::too_many_arguments)]
    pub fn record_change(
        &self,
        change_type: ChangeType,
        entity_id: &str,
        description: &str,
        baseline_quality: f64,
        baseline_cost: f64,
        rollback_data: &str,
    ) -> Change {
        let change = Change {
            id: Uuid::new_v4().to_string(),
            change_type,
            entity_id: entity_id.to_string(),
            description: description.to_string(),
            status: ChangeStatus::Observing,
            baseline_quality,
            baseline_cost,
            current_quality: 0.0,
            current_cost: 0.0,
            window_size: self.window_size,
            runs_observed: 0,
            threshold: self.threshold,
            rollback_data: rollback_data.to_string(),
            created_at: Utc::now(),
            decided_at: None,
        };
        let mut changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());
        changes.insert(change.id.clone(), change.clone());
        change
    }

    /// Feed one completed run into every observing change for `entity_id`.
    /// Returns the changes that rolled back, so the caller can restore their
    /// `rollback_data`.
    pub fn observe_run(&self, entity_id: &str, quality: f64, cost: f64) -> Vec<Change> {
        let mut rolled_back = Vec::new();
        let mut changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());

        for change in changes.values_mut() {
            if change.status != ChangeStatus::Observing || change.entity_id != entity_id {
                continue;
            }

            let n = change.runs_observed as f64;
            change.current_quality = (change.current_quality * n + quality) / (n + 1.0);
            change.current_cost = (change.current_cost * n + cost) / (n + 1.0);
            change.runs_observed += 1;

            if change.runs_observed >= change.window_size {
                // A zero baseline has nothing to regress from.
                let degraded = change.baseline_quality > 0.0
                    && change.current_quality / change.baseline_quality < change.threshold;
                change.status = if degraded {
                    ChangeStatus::RolledBack
                } else {
                    ChangeStatus::Accepted
                };
                change.decided_at = Some(Utc::now());
                if degraded {
                    tracing::warn!(
                        "change {} on {} rolled back: quality {:.3} vs baseline {:.3}",
                        change.id,
                        change.entity_id,
                        change.current_quality,
                        change.baseline_quality,
                    );
                    rolled_back.push(change.clone());
                }
            }
        }
        rolled_back
    }

    /// Accept immediately, skipping the rest of the window.
    pub fn force_accept(&self, change_id: &str) -> Result<Change> {
        self.force_decide(change_id, ChangeStatus::Accepted)
    }

    /// Roll back immediately, skipping the rest of the window.
    pub fn force_rollback(&self, change_id: &str) -> Result<Change> {
        self.force_decide(change_id, ChangeStatus::RolledBack)
    }

    fn force_decide(&self, change_id: &str, status: ChangeStatus) -> Result<Change> {
        let mut changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());
        let change = changes
            .get_mut(change_id)
            .ok_or_else(|| FlywheelError::ChangeNotFound {
                id: change_id.into(),
            })?;
        change.status = status;
        change.decided_at = Some(Utc::now());
        Ok(change.clone())
    }

    pub fn get(&self, change_id: &str) -> Option<Change> {
        let changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());
        changes.get(change_id).cloned()
    }

    pub fn observing(&self) -> Vec<Change> {
        let changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());
        changes
            .values()
            .filter(|c| c.status == ChangeStatus::Observing)
            .cloned()
            .collect()
    }

    pub fn list(&self) -> Vec<Change> {
        let changes = self.changes.lock().unwrap_or_else(|e| e.into_inner());
        changes.values().cloned().collect()
    }
}
