// src/evolution/fitness.rs — Fitness scoring for skills

use crate::infra::config::EvolutionConfig;
use crate::skills::SkillMeta;

/// Reference cost: a skill averaging $0.10/run scores zero on the cost axis.
const COST_REFERENCE_USD: f64 = 0.10;

/// Speed axis spans four decades: 1ms scores 1.0, 10s scores 0.0.
const SPEED_LOG_DECADES: f64 = 4.0;

/// Relative weights of the four fitness components. Must sum to 1 for the
/// score to stay a meaningful blend; `compute_fitness` clamps regardless.
#[derive(Debug, Clone, Copy)]
pub struct FitnessWeights {
    pub success: f64,
    pub quality: f64,
    pub cost: f64,
    pub speed: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            success: 0.35,
            quality: 0.30,
            cost: 0.20,
            speed: 0.15,
        }
    }
}

impl From<&EvolutionConfig> for FitnessWeights {
    fn from(cfg: &EvolutionConfig) -> Self {
        Self {
            success: cfg.success_weight,
            quality: cfg.quality_weight,
            cost: cfg.cost_weight,
            speed: cfg.speed_weight,
        }
    }
}

/// Scalar fitness in [0,1] blending success rate, quality, cost efficiency,
/// and speed. Untested skills sit at 0.5, neither favored nor condemned.
pub fn compute_fitness(meta: &SkillMeta, weights: &FitnessWeights) -> f64 {
    if meta.total_runs == 0 {
        return 0.5;
    }

    let success = meta.success_rate;
    let quality = meta.avg_quality;
    let cost = 1.0 - (meta.avg_cost_usd / COST_REFERENCE_USD).min(1.0);
    let speed = 1.0 - (meta.avg_elapsed_ms.max(1.0).log10() / SPEED_LOG_DECADES).min(1.0);

    let score = weights.success * success
        + weights.quality * quality
        + weights.cost * cost
        + weights.speed * speed;
    score.clamp(0.0, 1.0)
}

/// A skill is deprecation-worthy once it has been observed long enough and
/// its fitness still sits below the threshold.
pub fn should_deprecate(
    meta: &SkillMeta,
    weights: &FitnessWeights,
    observation_runs: u64,
    threshold: f64,
) -> bool {
    meta.total_runs >= observation_runs && compute_fitness(meta, weights) < threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SkillKind;

    fn meta(runs: u64, success: f64, quality: f64, cost: f64, elapsed: f64) -> SkillMeta {
        let mut m = SkillMeta::new("s", "s", SkillKind::Code);
        m.total_runs = runs;
        m.success_rate = success;
        m.avg_quality = quality;
        m.avg_cost_usd = cost;
        m.avg_elapsed_ms = elapsed;
        m
    }

    // ─── Bounds ─────────────────────────────────────────────────

    #[test]
    fn test_untested_scores_half() {
        let m = meta(0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(compute_fitness(&m, &FitnessWeights::default()), 0.5);
    }

    #[test]
    fn test_perfect_skill_scores_high() {
        let m = meta(100, 1.0, 1.0, 0.0, 1.0);
        let f = compute_fitness(&m, &FitnessWeights::default());
        assert!(f > 0.9, "expected > 0.9, got {f}");
        assert!(f <= 1.0);
    }

    #[test]
    fn test_worst_skill_scores_low() {
        let m = meta(100, 0.0, 0.0, 1.0, 100_000.0);
        let f = compute_fitness(&m, &FitnessWeights::default());
        assert!(f < 0.3, "expected < 0.3, got {f}");
        assert!(f >= 0.0);
    }

    #[test]
    fn test_fitness_always_in_unit_interval() {
        let cases = [
            meta(1, 0.5, 0.5, 0.05, 500.0),
            meta(3, 1.0, 0.0, 10.0, 1.0),
            meta(50, 0.0, 1.0, 0.0, 1_000_000.0),
        ];
        for m in &cases {
            let f = compute_fitness(m, &FitnessWeights::default());
            assert!((0.0..=1.0).contains(&f), "fitness {f} out of range");
        }
    }

    // ─── Component behavior ─────────────────────────────────────

    #[test]
    fn test_speed_component_decades() {
        // 1ms and 10s differ by the full speed weight.
        let fast = meta(10, 1.0, 1.0, 0.0, 1.0);
        let slow = meta(10, 1.0, 1.0, 0.0, 10_000.0);
        let w = FitnessWeights::default();
        let delta = compute_fitness(&fast, &w) - compute_fitness(&slow, &w);
        assert!((delta - w.speed).abs() < 1e-9);
    }

    #[test]
    fn test_cost_component_saturates() {
        // Anything at or beyond $0.10/run bottoms out the cost axis.
        let pricey = meta(10, 1.0, 1.0, 0.10, 1.0);
        let obscene = meta(10, 1.0, 1.0, 5.0, 1.0);
        let w = FitnessWeights::default();
        assert_eq!(compute_fitness(&pricey, &w), compute_fitness(&obscene, &w));
    }

    #[test]
    fn test_challenger_beats_incumbent_scenario() {
        let incumbent = meta(10, 0.8, 0.7, 0.05, 1000.0);
        let challenger = meta(10, 0.95, 0.9, 0.001, 5.0);
        let w = FitnessWeights::default();
        assert!(compute_fitness(&challenger, &w) > compute_fitness(&incumbent, &w));
    }

    // ─── Deprecation ────────────────────────────────────────────

    #[test]
    fn test_should_deprecate_needs_observation() {
        let w = FitnessWeights::default();
        let young = meta(4, 0.0, 0.0, 1.0, 100_000.0);
        assert!(!should_deprecate(&young, &w, 5, 0.3));

        let observed = meta(5, 0.0, 0.0, 1.0, 100_000.0);
        assert!(should_deprecate(&observed, &w, 5, 0.3));
    }

    #[test]
    fn test_should_not_deprecate_fit_skill() {
        let w = FitnessWeights::default();
        let fit = meta(100, 0.95, 0.9, 0.001, 10.0);
        assert!(!should_deprecate(&fit, &w, 5, 0.3));
    }
}
