// src/skills/registry.rs — Skill registry with fingerprint index

use std::collections::HashMap;
use std::sync::RwLock;

use super::types::{Skill, SkillMeta, SkillOutput, SkillStatus};
use crate::infra::errors::{FlywheelError, Result};

#[derive(Default)]
struct Inner {
    skills: HashMap<String, Skill>,
    by_fingerprint: HashMap<String, Vec<String>>,
}

/// Central registry of skills. The single mutator of its contents; other
/// subsystems read value snapshots.
#[derive(Default)]
pub struct SkillRegistry {
    inner: RwLock<Inner>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a skill, indexing it by fingerprint when one is set.
    pub fn register(&self, skill: Skill) -> Result<()> {
        validate(&skill.meta)?;
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if !skill.meta.fingerprint.is_empty() {
            let ids = inner
                .by_fingerprint
                .entry(skill.meta.fingerprint.clone())
                .or_default();
            if !ids.contains(&skill.meta.id) {
                ids.push(skill.meta.id.clone());
            }
        }
        inner.skills.insert(skill.meta.id.clone(), skill);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Skill> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.skills.get(id).cloned()
    }

    pub fn get_meta(&self, id: &str) -> Option<SkillMeta> {
        self.get(id).map(|s| s.meta)
    }

    /// All skills indexed under `fingerprint`, any status.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Vec<Skill> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_fingerprint
            .get(fingerprint)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.skills.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Best non-deprecated skill for a fingerprint: highest kind priority
    /// (CODE > HYBRID > LLM) wins outright; success rate only breaks ties
    /// within a kind.
    pub fn find_active(&self, fingerprint: &str) -> Option<Skill> {
        self.find_by_fingerprint(fingerprint)
            .into_iter()
            .filter(|s| s.meta.status != SkillStatus::Deprecated)
            .max_by(|a, b| {
                a.meta
                    .kind
                    .priority()
                    .cmp(&b.meta.kind.priority())
                    .then_with(|| {
                        a.meta
                            .success_rate
                            .partial_cmp(&b.meta.success_rate)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
    }

    pub fn update_status(&self, id: &str, status: SkillStatus) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let skill = inner
            .skills
            .get_mut(id)
            .ok_or_else(|| FlywheelError::SkillNotFound { id: id.into() })?;
        skill.meta.status = status;
        skill.meta.updated_at = chrono::Utc::now();
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let skill = inner
            .skills
            .remove(id)
            .ok_or_else(|| FlywheelError::SkillNotFound { id: id.into() })?;
        if let Some(ids) = inner.by_fingerprint.get_mut(&skill.meta.fingerprint) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                inner.by_fingerprint.remove(&skill.meta.fingerprint);
            }
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<SkillMeta> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.skills.values().map(|s| s.meta.clone()).collect()
    }

    pub fn count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.skills.len()
    }

    /// Fold one run's outcome into the skill's running averages.
    pub fn record_run(&self, id: &str, output: &SkillOutput) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let skill = inner
            .skills
            .get_mut(id)
            .ok_or_else(|| FlywheelError::SkillNotFound { id: id.into() })?;
        skill.meta.record_output(output);
        Ok(())
    }

    /// Fold a post-review quality score into the skill's running average.
    pub fn record_quality(&self, id: &str, quality: f64) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let skill = inner
            .skills
            .get_mut(id)
            .ok_or_else(|| FlywheelError::SkillNotFound { id: id.into() })?;
        skill.meta.record_quality(quality);
        Ok(())
    }
}

fn validate(meta: &SkillMeta) -> Result<()> {
    if meta.id.is_empty() {
        return Err(FlywheelError::Validation("skill id is empty".into()));
    }
    if meta.name.is_empty() {
        return Err(FlywheelError::Validation("skill name is empty".into()));
    }
    if !(0.0..=1.0).contains(&meta.success_rate) {
        return Err(FlywheelError::Validation(format!(
            "skill '{}' success_rate {} outside [0,1]",
            meta.id, meta.success_rate
        )));
    }
    if !(0.0..=1.0).contains(&meta.avg_quality) {
        return Err(FlywheelError::Validation(format!(
            "skill '{}' avg_quality {} outside [0,1]",
            meta.id, meta.avg_quality
        )));
    }
    Ok(())
}
