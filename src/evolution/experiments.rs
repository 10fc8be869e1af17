// src/evolution/experiments.rs — Hypothesis-driven A/B experiments

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::config::ExperimentConfig;
use crate::infra::errors::{FlywheelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Running,
    Concluded,
    Aborted,
}

/// A comparison of two labeled variants on a single scalar metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub hypothesis: String,
    pub variant_a: String,
    pub variant_b: String,
    pub metric: String,
    pub status: ExperimentStatus,
    pub samples_a: Vec<f64>,
    pub samples_b: Vec<f64>,
    pub min_samples: usize,
    pub winner: String,
    pub significance: f64,
    pub conclusion: String,
    pub created_at: DateTime<Utc>,
}

/// Runs experiments with a deliberately cheap Welch-style significance
/// approximation: a decision heuristic for an agent, not an academic test.
pub struct ExperimentManager {
    min_samples: usize,
    significance_threshold: f64,
    experiments: Mutex<HashMap<String, Experiment>>,
}

impl ExperimentManager {
    pub fn new(cfg: &ExperimentConfig) -> Self {
        Self {
            min_samples: cfg.min_samples,
            significance_threshold: cfg.significance_threshold,
            experiments: Mutex::new(HashMap::new()),
        }
    }

    pub fn start(
        &self,
        hypothesis: &str,
        variant_a: &str,
        variant_b: &str,
        metric: &str,
    ) -> Experiment {
        let exp = Experiment {
            id: Uuid::new_v4().to_string(),
            hypothesis: hypothesis.to_string(),
            variant_a: variant_a.to_string(),
            variant_b: variant_b.to_string(),
            metric: metric.to_string(),
            status: ExperimentStatus::Running,
            samples_a: Vec::new(),
            samples_b: Vec::new(),
            min_samples: self.min_samples,
            winner: String::new(),
            significance: 0.0,
            conclusion: String::new(),
            created_at: Utc::now(),
        };
        let mut experiments = self.experiments.lock().unwrap_or_else(|e| e.into_inner());
        experiments.insert(exp.id.clone(), exp.clone());
        exp
    }

    /// Append a sample to arm "A" or "B". Unknown ids and non-running
    /// experiments are rejected.
    pub fn record_sample(&self, id: &str, arm: &str, value: f64) -> Result<()> {
        let mut experiments = self.experiments.lock().unwrap_or_else(|e| e.into_inner());
        let exp = experiments
            .get_mut(id)
            .ok_or_else(|| FlywheelError::ExperimentNotFound { id: id.into() })?;
        if exp.status != ExperimentStatus::Running {
            return Err(FlywheelError::ExperimentNotRunning { id: id.into() });
        }
        match arm {
            "A" => exp.samples_a.push(value),
            "B" => exp.samples_b.push(value),
            other => {
                return Err(FlywheelError::Validation(format!(
                    "unknown experiment arm '{other}', expected \"A\" or \"B\""
                )))
            }
        }
        Ok(())
    }

    /// Conclude the experiment if both arms have enough samples. Returns the
    /// updated experiment either way.
    pub fn evaluate(&self, id: &str) -> Result<Experiment> {
        let mut experiments = self.experiments.lock().unwrap_or_else(|e| e.into_inner());
        let exp = experiments
            .get_mut(id)
            .ok_or_else(|| FlywheelError::ExperimentNotFound { id: id.into() })?;

        if exp.status != ExperimentStatus::Running
            || exp.samples_a.len() < exp.min_samples
            || exp.samples_b.len() < exp.min_samples
        {
            return Ok(exp.clone());
        }

        let mean_a = mean(&exp.samples_a);
        let mean_b = mean(&exp.samples_b);
        let p = welch_p(&exp.samples_a, &exp.samples_b);

        exp.significance = p;
        exp.status = ExperimentStatus::Concluded;
        if p > self.significance_threshold {
            exp.winner = "inconclusive".to_string();
            exp.conclusion = format!(
                "No significant difference on {} (p={:.3}, A={:.3}, B={:.3})",
                exp.metric, p, mean_a, mean_b
            );
        } else {
            let (winner, w_mean, l_mean) = if mean_a > mean_b {
                ("A", mean_a, mean_b)
            } else {
                ("B", mean_b, mean_a)
            };
            exp.winner = winner.to_string();
            exp.conclusion = format!(
                "Variant {} wins on {} ({:.3} vs {:.3}, p={:.3})",
                winner, exp.metric, w_mean, l_mean, p
            );
        }
        tracing::info!("experiment {} concluded: {}", id, exp.conclusion);
        Ok(exp.clone())
    }

    pub fn abort(&self, id: &str) -> Result<()> {
        let mut experiments = self.experiments.lock().unwrap_or_else(|e| e.into_inner());
        let exp = experiments
            .get_mut(id)
            .ok_or_else(|| FlywheelError::ExperimentNotFound { id: id.into() })?;
        if exp.status != ExperimentStatus::Running {
            return Err(FlywheelError::ExperimentNotRunning { id: id.into() });
        }
        exp.status = ExperimentStatus::Aborted;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Experiment> {
        let experiments = self.experiments.lock().unwrap_or_else(|e| e.into_inner());
        experiments.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Experiment> {
        let experiments = self.experiments.lock().unwrap_or_else(|e| e.into_inner());
        experiments.values().cloned().collect()
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample variance with Bessel's correction.
fn variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (samples.len() - 1) as f64
}

/// Two-tailed Welch-style p approximation:
/// `t = |meanA − meanB| / sqrt(varA/nA + varB/nB)`, then
/// `p = clamp(2·exp(−0.717·t²), 0, 1)`.
pub fn welch_p(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return 1.0;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    let se = (variance(a) / a.len() as f64 + variance(b) / b.len() as f64).sqrt();
    if se == 0.0 {
        return if mean_a == mean_b { 1.0 } else { 0.0 };
    }
    let t = (mean_a - mean_b).abs() / se;
    (2.0 * (-0.717 * t * t).exp()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(min_samples: usize) -> ExperimentManager {
        ExperimentManager::new(&ExperimentConfig {
            min_samples,
            significance_threshold: 0.05,
        })
    }

    // ─── Welch approximation ────────────────────────────────────

    #[test]
    fn test_welch_identical_sets() {
        let a = vec![0.5, 0.6, 0.7, 0.5, 0.6];
        assert_eq!(welch_p(&a, &a.clone()), 1.0);
    }

    #[test]
    fn test_welch_well_separated() {
        let a = vec![0.10, 0.11, 0.09, 0.10, 0.10];
        let b = vec![0.90, 0.91, 0.89, 0.90, 0.90];
        assert!(welch_p(&a, &b) < 0.01);
    }

    #[test]
    fn test_welch_tiny_samples() {
        assert_eq!(welch_p(&[1.0], &[2.0, 3.0]), 1.0);
        assert_eq!(welch_p(&[1.0, 2.0], &[5.0]), 1.0);
        assert_eq!(welch_p(&[], &[]), 1.0);
    }

    #[test]
    fn test_welch_zero_variance_unequal_means() {
        let a = vec![1.0, 1.0, 1.0];
        let b = vec![2.0, 2.0, 2.0];
        assert_eq!(welch_p(&a, &b), 0.0);
    }

    #[test]
    fn test_variance_bessel() {
        // Sample variance of {1,2,3} is 1.0 with n-1 in the denominator.
        assert!((variance(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-9);
        assert_eq!(variance(&[5.0]), 0.0);
    }

    // ─── Lifecycle ──────────────────────────────────────────────

    #[test]
    fn test_start_and_record() {
        let mgr = manager(3);
        let exp = mgr.start("cheap model is enough", "haiku", "sonnet", "quality");
        assert_eq!(exp.status, ExperimentStatus::Running);
        assert_eq!(exp.min_samples, 3);

        mgr.record_sample(&exp.id, "A", 0.8).unwrap();
        mgr.record_sample(&exp.id, "B", 0.9).unwrap();
        assert_eq!(mgr.get(&exp.id).unwrap().samples_a.len(), 1);
    }

    #[test]
    fn test_record_rejects_unknown() {
        let mgr = manager(3);
        assert!(matches!(
            mgr.record_sample("ghost", "A", 1.0),
            Err(FlywheelError::ExperimentNotFound { .. })
        ));

        let exp = mgr.start("h", "a", "b", "m");
        assert!(matches!(
            mgr.record_sample(&exp.id, "C", 1.0),
            Err(FlywheelError::Validation(_))
        ));
    }

    #[test]
    fn test_evaluate_below_min_samples_stays_running() {
        let mgr = manager(5);
        let exp = mgr.start("h", "a", "b", "m");
        mgr.record_sample(&exp.id, "A", 1.0).unwrap();
        let exp = mgr.evaluate(&exp.id).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Running);
        assert!(exp.winner.is_empty());
    }

    #[test]
    fn test_evaluate_concludes_with_winner() {
        let mgr = manager(5);
        let exp = mgr.start("B is better", "a", "b", "quality");
        for _ in 0..5 {
            mgr.record_sample(&exp.id, "A", 0.1).unwrap();
            mgr.record_sample(&exp.id, "B", 0.9).unwrap();
        }
        // Tiny jitter so variance is nonzero on both arms.
        mgr.record_sample(&exp.id, "A", 0.12).unwrap();
        mgr.record_sample(&exp.id, "B", 0.88).unwrap();

        let exp = mgr.evaluate(&exp.id).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Concluded);
        assert_eq!(exp.winner, "B");
        assert!(exp.significance < 0.05);
        assert!(exp.conclusion.contains("Variant B"));
    }

    #[test]
    fn test_evaluate_inconclusive_on_overlap() {
        let mgr = manager(4);
        let exp = mgr.start("no difference", "a", "b", "quality");
        for v in [0.5, 0.6, 0.55, 0.58] {
            mgr.record_sample(&exp.id, "A", v).unwrap();
            mgr.record_sample(&exp.id, "B", v + 0.01).unwrap();
        }
        let exp = mgr.evaluate(&exp.id).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Concluded);
        assert_eq!(exp.winner, "inconclusive");
    }

    #[test]
    fn test_record_after_conclusion_rejected() {
        let mgr = manager(2);
        let exp = mgr.start("h", "a", "b", "m");
        for v in [0.1, 0.2] {
            mgr.record_sample(&exp.id, "A", v).unwrap();
            mgr.record_sample(&exp.id, "B", v + 0.8).unwrap();
        }
        mgr.evaluate(&exp.id).unwrap();
        assert!(matches!(
            mgr.record_sample(&exp.id, "A", 0.3),
            Err(FlywheelError::ExperimentNotRunning { .. })
        ));
    }

    #[test]
    fn test_abort() {
        let mgr = manager(3);
        let exp = mgr.start("h", "a", "b", "m");
        mgr.abort(&exp.id).unwrap();
        assert_eq!(mgr.get(&exp.id).unwrap().status, ExperimentStatus::Aborted);
        assert!(mgr.abort(&exp.id).is_err());
    }
}
