//! Dispersion analysis for sibling scores.
//!
//! Pure functions over a slice of scores: moments, coefficient of variation,
//! a range-based dispersion index, a CV-based scenario classification, and a
//! shape check that flags two well-separated modes.
//!
//! The shape check sorts the scores, splits them into a lower and an upper
//! half, and measures how far apart the half means are relative to the spread
//! inside each half (an Ashman's-D-style separation). One-sided unimodal
//! shapes land well below 2.0 (normal ≈ 1.3, uniform ≈ 1.7); two tight
//! clusters grow without bound.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;
use crate::model::MAX_SCORE;

/// Floor on within-half spread before the separation index saturates.
const SPREAD_FLOOR: f64 = 1e-9;
/// Saturation value for the separation index (keeps JSON finite).
const MAX_SEPARATION_INDEX: f64 = 1e3;
/// Minimum sample count for a meaningful shape check (two per half).
const MIN_SHAPE_SAMPLES: usize = 4;

// ---------------------------------------------------------------------
//  Config
// ---------------------------------------------------------------------

/// Cut points for scenario and shape classification.
///
/// CV boundaries are configurable; the defaults are the values the
/// regression tests assert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionConfig {
    /// CV below this is `convergence`.
    pub convergence_cv: f64,
    /// CV below this (and at or above `convergence_cv`) is `moderate`.
    pub moderate_cv: f64,
    /// CV below this is `high_dispersion`; at or above is `extreme_dispersion`.
    pub high_cv: f64,
    /// Separation index strictly above this classifies the sample as bimodal.
    pub bimodality_threshold: f64,
    /// Allowed deviation of supplied weights from a unit sum.
    pub weight_tolerance: f64,
    /// Normaliser for the range-based dispersion index.
    pub max_score: f64,
}

impl Default for DispersionConfig {
    fn default() -> Self {
        Self {
            convergence_cv: 0.15,
            moderate_cv: 0.40,
            high_cv: 0.60,
            bimodality_threshold: 2.0,
            weight_tolerance: 1e-6,
            max_score: MAX_SCORE,
        }
    }
}

// ---------------------------------------------------------------------
//  Data model
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispersionScenario {
    Convergence,
    Moderate,
    HighDispersion,
    ExtremeDispersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    Unimodal,
    Bimodal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionMetrics {
    pub sample_count: usize,
    pub mean: f64,
    /// Population variance `Σ(x - mean)² / n`.
    pub variance: f64,
    pub std_dev: f64,
    /// `std_dev / mean`, or 0 when the mean is 0.
    pub coefficient_of_variation: f64,
    /// `(max - min) / max_score`, in `[0, 1]`.
    pub dispersion_index: f64,
    pub min: f64,
    pub max: f64,
    pub scenario: DispersionScenario,
    pub shape_classification: ShapeClass,
    pub separation_index: f64,
}

impl DispersionMetrics {
    /// Too small or too flat to penalise: two members or fewer, or no spread.
    pub fn is_degenerate(&self) -> bool {
        self.sample_count <= 2 || self.is_constant()
    }

    /// A single member or identical members; nothing to resample.
    pub fn is_constant(&self) -> bool {
        self.sample_count < 2 || self.variance <= f64::EPSILON
    }
}

// ---------------------------------------------------------------------
//  Utilities
// ---------------------------------------------------------------------

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var.max(0.0).sqrt())
}

/// Check that `weights` is a usable weight vector for `len` values.
pub fn validate_weights(len: usize, weights: &[f64], tolerance: f64) -> Result<(), StatsError> {
    if weights.len() != len {
        return Err(StatsError::validation(format!(
            "weight count {} does not match score count {len}",
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(StatsError::validation(format!(
            "weights must be finite and non-negative, got {w}"
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > tolerance {
        return Err(StatsError::validation(format!(
            "weights must sum to 1.0, got {sum:.6}"
        )));
    }
    Ok(())
}

/// Rescale non-negative weights to sum to 1. Returns `None` if they sum to 0.
pub fn normalize_weights(weights: &[f64]) -> Option<Vec<f64>> {
    let sum: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if sum <= 0.0 || !sum.is_finite() {
        return None;
    }
    Some(weights.iter().map(|w| w.max(0.0) / sum).collect())
}

/// Weighted mean with unit-sum weights, or the plain mean when `weights` is `None`.
pub fn weighted_mean(scores: &[f64], weights: Option<&[f64]>) -> f64 {
    match weights {
        Some(w) if w.len() == scores.len() => scores.iter().zip(w).map(|(s, w)| s * w).sum(),
        _ => {
            if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            }
        }
    }
}

/// Separation of the lower and upper sorted halves relative to their spread.
///
/// Returns 0 for fewer than four values or when the halves coincide.
pub fn separation_index(values: &[f64]) -> f64 {
    if values.len() < MIN_SHAPE_SAMPLES {
        return 0.0;
    }
    let sorted = sorted_copy(values);
    let mid = sorted.len() / 2;
    let (m_lo, s_lo) = mean_and_std(&sorted[..mid]);
    let (m_hi, s_hi) = mean_and_std(&sorted[mid..]);
    let separation = (m_hi - m_lo).abs();
    if separation <= SPREAD_FLOOR {
        return 0.0;
    }
    (separation / (s_lo + s_hi).max(SPREAD_FLOOR)).min(MAX_SEPARATION_INDEX)
}

pub fn classify_scenario(cv: f64, cfg: &DispersionConfig) -> DispersionScenario {
    if cv < cfg.convergence_cv {
        DispersionScenario::Convergence
    } else if cv < cfg.moderate_cv {
        DispersionScenario::Moderate
    } else if cv < cfg.high_cv {
        DispersionScenario::HighDispersion
    } else {
        DispersionScenario::ExtremeDispersion
    }
}

pub fn classify_shape(separation: f64, cfg: &DispersionConfig) -> ShapeClass {
    if separation > cfg.bimodality_threshold {
        ShapeClass::Bimodal
    } else {
        ShapeClass::Unimodal
    }
}

// ---------------------------------------------------------------------
//  Analyzer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DispersionAnalyzer {
    pub cfg: DispersionConfig,
}

impl DispersionAnalyzer {
    pub fn new(cfg: DispersionConfig) -> Self {
        Self { cfg }
    }

    /// Analyze a nonempty score slice. Supplied weights must sum to 1.0; they
    /// are only validated here (moments are unweighted).
    pub fn analyze(
        &self,
        scores: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<DispersionMetrics, StatsError> {
        if scores.is_empty() {
            return Err(StatsError::validation("cannot analyze dispersion of an empty score set"));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(StatsError::validation(format!("non-finite score {bad}")));
        }
        if let Some(w) = weights {
            validate_weights(scores.len(), w, self.cfg.weight_tolerance)?;
        }

        let (mean, std_dev) = mean_and_std(scores);
        let variance = std_dev * std_dev;
        let cv = if mean.abs() <= f64::EPSILON {
            0.0
        } else {
            (std_dev / mean).abs()
        };
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let dispersion_index = if self.cfg.max_score > 0.0 {
            ((max - min) / self.cfg.max_score).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let separation = separation_index(scores);

        Ok(DispersionMetrics {
            sample_count: scores.len(),
            mean,
            variance,
            std_dev,
            coefficient_of_variation: cv,
            dispersion_index,
            min,
            max,
            scenario: classify_scenario(cv, &self.cfg),
            shape_classification: classify_shape(separation, &self.cfg),
            separation_index: separation,
        })
    }
}
