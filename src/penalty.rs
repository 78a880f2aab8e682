//! Dispersion-aware penalty for aggregated scores.
//!
//! `penalty_factor = clamp(1 - w · m(scenario) · s(shape) · dispersion_index, 0.5, 1.0)`
//!
//! where `w` is the base penalty weight, `m` a per-scenario sensitivity
//! multiplier and `s` a shape factor (> 1 for bimodal samples). The factor
//! never removes more than half of the score. Degenerate samples (two members
//! or fewer, or zero variance) are not penalised.

use serde::{Deserialize, Serialize};

use crate::dispersion::{
    weighted_mean, DispersionAnalyzer, DispersionMetrics, DispersionScenario, ShapeClass,
};
use crate::error::StatsError;

/// Lowest allowed penalty factor.
pub const PENALTY_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    pub base_penalty_weight: f64,
    pub convergence_multiplier: f64,
    pub moderate_multiplier: f64,
    pub high_dispersion_multiplier: f64,
    pub extreme_dispersion_multiplier: f64,
    /// Multiplier applied when the sample is bimodal.
    pub bimodal_shape_factor: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            base_penalty_weight: 0.3,
            convergence_multiplier: 0.5,
            moderate_multiplier: 1.0,
            high_dispersion_multiplier: 1.5,
            extreme_dispersion_multiplier: 2.0,
            bimodal_shape_factor: 1.2,
        }
    }
}

impl PenaltyConfig {
    pub fn sensitivity_multiplier(&self, scenario: DispersionScenario) -> f64 {
        match scenario {
            DispersionScenario::Convergence => self.convergence_multiplier,
            DispersionScenario::Moderate => self.moderate_multiplier,
            DispersionScenario::HighDispersion => self.high_dispersion_multiplier,
            DispersionScenario::ExtremeDispersion => self.extreme_dispersion_multiplier,
        }
    }

    pub fn shape_factor(&self, shape: ShapeClass) -> f64 {
        match shape {
            ShapeClass::Unimodal => 1.0,
            ShapeClass::Bimodal => self.bimodal_shape_factor.max(1.0),
        }
    }
}

/// Result of scoring one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyOutcome {
    pub weighted_mean: f64,
    pub penalty_factor: f64,
    pub adjusted_score: f64,
    pub metrics: DispersionMetrics,
}

/// Adaptive vs fixed (scenario-insensitive) penalty on the same sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyComparison {
    pub scenario: DispersionScenario,
    pub adaptive_factor: f64,
    pub fixed_factor: f64,
    pub adaptive_score: f64,
    pub fixed_score: f64,
    /// `adaptive_score - fixed_score`.
    pub delta: f64,
}

impl PenaltyComparison {
    /// Adaptive is at least as lenient under convergence and at least as
    /// strict under high or extreme dispersion.
    pub fn is_consistent(&self) -> bool {
        const EPS: f64 = 1e-12;
        match self.scenario {
            DispersionScenario::Convergence => self.adaptive_factor + EPS >= self.fixed_factor,
            DispersionScenario::Moderate => true,
            DispersionScenario::HighDispersion | DispersionScenario::ExtremeDispersion => {
                self.adaptive_factor <= self.fixed_factor + EPS
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptivePenaltyScorer {
    pub cfg: PenaltyConfig,
}

impl AdaptivePenaltyScorer {
    pub fn new(cfg: PenaltyConfig) -> Self {
        Self { cfg }
    }

    pub fn penalty_factor(&self, metrics: &DispersionMetrics) -> f64 {
        if metrics.is_degenerate() {
            return 1.0;
        }
        let m = self.cfg.sensitivity_multiplier(metrics.scenario);
        let s = self.cfg.shape_factor(metrics.shape_classification);
        let raw = 1.0 - self.cfg.base_penalty_weight * m * s * metrics.dispersion_index;
        raw.clamp(PENALTY_FLOOR, 1.0)
    }

    /// Baseline that ignores scenario and shape.
    pub fn fixed_penalty_factor(&self, metrics: &DispersionMetrics) -> f64 {
        if metrics.is_degenerate() {
            return 1.0;
        }
        (1.0 - self.cfg.base_penalty_weight * metrics.dispersion_index).clamp(PENALTY_FLOOR, 1.0)
    }

    /// Analyze, average and penalise one group of scores.
    pub fn score(
        &self,
        analyzer: &DispersionAnalyzer,
        scores: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<PenaltyOutcome, StatsError> {
        let metrics = analyzer.analyze(scores, weights)?;
        let mean = weighted_mean(scores, weights);
        let penalty_factor = self.penalty_factor(&metrics);
        Ok(PenaltyOutcome {
            weighted_mean: mean,
            penalty_factor,
            adjusted_score: mean * penalty_factor,
            metrics,
        })
    }

    pub fn compare_with_fixed(&self, metrics: &DispersionMetrics, weighted_mean: f64) -> PenaltyComparison {
        let adaptive_factor = self.penalty_factor(metrics);
        let fixed_factor = self.fixed_penalty_factor(metrics);
        let adaptive_score = weighted_mean * adaptive_factor;
        let fixed_score = weighted_mean * fixed_factor;
        PenaltyComparison {
            scenario: metrics.scenario,
            adaptive_factor,
            fixed_factor,
            adaptive_score,
            fixed_score,
            delta: adaptive_score - fixed_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(scores: &[f64], weights: Option<&[f64]>) -> PenaltyOutcome {
        AdaptivePenaltyScorer::default()
            .score(&DispersionAnalyzer::default(), scores, weights)
            .unwrap()
    }

    #[test]
    fn converged_scores_are_not_penalised() {
        let out = score(&[2.5, 2.5, 2.5, 2.5], None);
        assert_eq!(out.penalty_factor, 1.0);
        assert!((out.adjusted_score - 2.5).abs() < 1e-12);
    }

    #[test]
    fn extreme_dispersion_is_penalised_hard() {
        let out = score(&[0.0, 1.0, 2.0, 3.0], None);
        assert_eq!(out.metrics.scenario, DispersionScenario::ExtremeDispersion);
        assert!(out.penalty_factor < 0.75);
        assert!(out.penalty_factor >= PENALTY_FLOOR);
    }

    #[test]
    fn weighted_aggregation_uses_weights() {
        let out = score(&[1.0, 2.0, 2.0, 3.0], Some(&[0.1, 0.3, 0.3, 0.3]));
        assert!((out.weighted_mean - 2.2).abs() < 1e-12);
        assert!((out.adjusted_score - 2.2 * out.penalty_factor).abs() < 1e-12);
    }

    #[test]
    fn single_member_group_is_untouched() {
        let out = score(&[1.4], None);
        assert_eq!(out.metrics.variance, 0.0);
        assert_eq!(out.penalty_factor, 1.0);
        assert!((out.adjusted_score - 1.4).abs() < 1e-12);
    }

    #[test]
    fn two_member_groups_are_untouched() {
        let close = score(&[1.0, 2.0], None);
        assert_eq!(close.penalty_factor, 1.0);
        assert!((close.adjusted_score - 1.5).abs() < 1e-12);

        let apart = score(&[0.0, 3.0], None);
        assert!(apart.metrics.variance > 0.0);
        assert_eq!(apart.penalty_factor, 1.0);
        assert!((apart.adjusted_score - 1.5).abs() < 1e-12);

        let cmp = AdaptivePenaltyScorer::default().compare_with_fixed(&apart.metrics, apart.weighted_mean);
        assert_eq!(cmp.fixed_factor, 1.0);
        assert_eq!(cmp.delta, 0.0);

        let three = score(&[0.0, 1.5, 3.0], None);
        assert!(three.penalty_factor < 1.0);
    }

    #[test]
    fn penalty_factor_stays_within_bounds() {
        let scorer = AdaptivePenaltyScorer::new(PenaltyConfig {
            base_penalty_weight: 1.0,
            extreme_dispersion_multiplier: 5.0,
            bimodal_shape_factor: 3.0,
            ..PenaltyConfig::default()
        });
        let analyzer = DispersionAnalyzer::default();
        let grid = [0.0, 0.3, 0.75, 1.5, 2.25, 2.9, 3.0];
        for &a in &grid {
            for &b in &grid {
                for &c in &grid {
                    for &d in &grid {
                        let out = scorer.score(&analyzer, &[a, b, c, d], None).unwrap();
                        assert!(
                            (PENALTY_FLOOR..=1.0).contains(&out.penalty_factor),
                            "factor {} out of bounds for {:?}",
                            out.penalty_factor,
                            [a, b, c, d]
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn adaptive_is_lenient_under_convergence_and_strict_under_dispersion() {
        let scorer = AdaptivePenaltyScorer::default();
        let analyzer = DispersionAnalyzer::default();

        let calm = analyzer.analyze(&[2.4, 2.5, 2.6, 2.5], None).unwrap();
        assert_eq!(calm.scenario, DispersionScenario::Convergence);
        let cmp = scorer.compare_with_fixed(&calm, calm.mean);
        assert!(cmp.adaptive_factor > cmp.fixed_factor);
        assert!(cmp.delta > 0.0);
        assert!(cmp.is_consistent());

        let wild = analyzer.analyze(&[0.2, 2.9, 0.4, 2.8], None).unwrap();
        let cmp = scorer.compare_with_fixed(&wild, wild.mean);
        assert!(matches!(
            cmp.scenario,
            DispersionScenario::HighDispersion | DispersionScenario::ExtremeDispersion
        ));
        assert!(cmp.adaptive_factor < cmp.fixed_factor);
        assert!(cmp.is_consistent());
    }
}
