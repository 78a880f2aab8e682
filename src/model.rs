//! Score records flowing through the four aggregation phases.
//!
//! All records are built once per run and never mutated afterwards. Each level
//! owns the child records it was built from, so a [`MacroScore`] can be walked
//! back to the atomic question ids that produced it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alignment::StrategicAlignmentMetrics;
use crate::bootstrap::ConvergenceDiagnostics;
use crate::dispersion::DispersionMetrics;
use crate::hermeticity::HermeticityDiagnosis;

/// Upper end of the score scale.
pub const MAX_SCORE: f64 = 3.0;

// =============================================================================
// Phases and quality bands
// =============================================================================

/// The four aggregation levels, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationLevel {
    Dimension,
    Area,
    Cluster,
    Macro,
}

impl AggregationLevel {
    pub const ALL: [AggregationLevel; 4] = [
        AggregationLevel::Dimension,
        AggregationLevel::Area,
        AggregationLevel::Cluster,
        AggregationLevel::Macro,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dimension => "dimension",
            Self::Area => "area",
            Self::Cluster => "cluster",
            Self::Macro => "macro",
        }
    }

    /// The level whose output feeds this one.
    pub fn previous(self) -> Option<AggregationLevel> {
        match self {
            Self::Dimension => None,
            Self::Area => Some(Self::Dimension),
            Self::Cluster => Some(Self::Area),
            Self::Macro => Some(Self::Cluster),
        }
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality band for an aggregated score, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityLevel {
    Insufficient,
    Acceptable,
    Good,
    Excellent,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insufficient => "INSUFFICIENT",
            Self::Acceptable => "ACCEPTABLE",
            Self::Good => "GOOD",
            Self::Excellent => "EXCELLENT",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Confidence intervals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalMethod {
    #[serde(rename = "BCa")]
    Bca,
    #[serde(rename = "analytical")]
    Analytical,
}

/// Interval around an aggregated score.
///
/// Invariant: `0 <= lower_bound <= point_estimate <= upper_bound <= max_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence_level: f64,
    pub method: IntervalMethod,
    pub sample_count: usize,
    /// Present when convergence diagnostics were requested for a bootstrap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceDiagnostics>,
}

impl ConfidenceInterval {
    /// Build an interval, clamping into `[0, max_score]` and widening so it
    /// always contains the point estimate.
    pub fn bounded(
        point_estimate: f64,
        lower: f64,
        upper: f64,
        confidence_level: f64,
        method: IntervalMethod,
        sample_count: usize,
        max_score: f64,
    ) -> Self {
        let point = point_estimate.clamp(0.0, max_score);
        let lower = if lower.is_finite() { lower } else { point };
        let upper = if upper.is_finite() { upper } else { point };
        Self {
            point_estimate: point,
            lower_bound: lower.min(point).clamp(0.0, max_score),
            upper_bound: upper.max(point).clamp(0.0, max_score),
            confidence_level,
            method,
            sample_count,
            convergence: None,
        }
    }

    pub fn with_convergence(mut self, diagnostics: ConvergenceDiagnostics) -> Self {
        self.convergence = Some(diagnostics);
        self
    }

    /// Zero-width interval for single-member or zero-spread groups.
    pub fn collapsed(point_estimate: f64, confidence_level: f64, sample_count: usize, max_score: f64) -> Self {
        Self::bounded(
            point_estimate,
            point_estimate,
            point_estimate,
            confidence_level,
            IntervalMethod::Analytical,
            sample_count,
            max_score,
        )
    }

    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }
}

// =============================================================================
// Score records
// =============================================================================

/// Per-question score produced upstream by the scoring phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicScore {
    pub question_id: String,
    pub base_slot: String,
    pub policy_area_id: String,
    pub dimension_id: String,
    /// Score on the `[0, MAX_SCORE]` scale.
    pub score: f64,
    /// Upstream quality label; opaque to this engine.
    pub quality_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl AtomicScore {
    pub fn new(
        question_id: impl Into<String>,
        policy_area_id: impl Into<String>,
        dimension_id: impl Into<String>,
        score: f64,
    ) -> Self {
        let question_id = question_id.into();
        Self {
            base_slot: question_id.clone(),
            question_id,
            policy_area_id: policy_area_id.into(),
            dimension_id: dimension_id.into(),
            score,
            quality_level: String::new(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub policy_area_id: String,
    pub dimension_id: String,
    pub score: f64,
    pub quality_level: QualityLevel,
    /// Atomic question ids in input order; never empty.
    pub contributing_question_ids: Vec<String>,
    pub dispersion_metrics: DispersionMetrics,
    pub penalty_factor: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaScore {
    pub area_id: String,
    pub area_name: String,
    pub score: f64,
    pub quality_level: QualityLevel,
    pub dimension_scores: Vec<DimensionScore>,
    pub dispersion_metrics: DispersionMetrics,
    pub penalty_factor: f64,
    pub hermeticity: HermeticityDiagnosis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
}

impl AreaScore {
    pub fn dimension_ids(&self) -> Vec<&str> {
        self.dimension_scores
            .iter()
            .map(|d| d.dimension_id.as_str())
            .collect()
    }

    pub fn question_ids(&self) -> BTreeSet<&str> {
        self.dimension_scores
            .iter()
            .flat_map(|d| d.contributing_question_ids.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterScore {
    pub cluster_id: String,
    pub cluster_name: String,
    pub score: f64,
    pub quality_level: QualityLevel,
    /// `1 - dispersion_index` of member area scores, in `[0, 1]`.
    pub coherence: f64,
    pub area_scores: Vec<AreaScore>,
    pub dispersion_metrics: DispersionMetrics,
    pub penalty_factor: f64,
    /// Declared member areas that were absent from the input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_area_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
}

impl ClusterScore {
    pub fn area_ids(&self) -> Vec<&str> {
        self.area_scores.iter().map(|a| a.area_id.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroScore {
    pub score: f64,
    pub quality_level: QualityLevel,
    pub cluster_scores: Vec<ClusterScore>,
    /// Mean cluster coherence, in `[0, 1]`.
    pub cross_cutting_coherence: f64,
    pub strategic_alignment: StrategicAlignmentMetrics,
    pub dispersion_metrics: DispersionMetrics,
    pub penalty_factor: f64,
    pub hermeticity: HermeticityDiagnosis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
}

impl MacroScore {
    /// Every atomic question id reachable from this score.
    pub fn question_ids(&self) -> BTreeSet<&str> {
        self.cluster_scores
            .iter()
            .flat_map(|c| c.area_scores.iter())
            .flat_map(|a| a.question_ids())
            .collect()
    }

    /// Path `cluster -> area -> dimension` under which a question id was aggregated.
    pub fn trace_question(&self, question_id: &str) -> Option<(&str, &str, &str)> {
        for cluster in &self.cluster_scores {
            for area in &cluster.area_scores {
                for dim in &area.dimension_scores {
                    if dim.contributing_question_ids.iter().any(|q| q == question_id) {
                        return Some((
                            cluster.cluster_id.as_str(),
                            area.area_id.as_str(),
                            dim.dimension_id.as_str(),
                        ));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_interval_contains_point_and_is_clamped() {
        let ci = ConfidenceInterval::bounded(2.0, 2.2, 3.4, 0.95, IntervalMethod::Bca, 2000, MAX_SCORE);
        assert_eq!(ci.lower_bound, 2.0);
        assert_eq!(ci.upper_bound, MAX_SCORE);
        assert!(ci.lower_bound <= ci.point_estimate && ci.point_estimate <= ci.upper_bound);

        let ci = ConfidenceInterval::bounded(0.5, -1.0, f64::NAN, 0.95, IntervalMethod::Bca, 10, MAX_SCORE);
        assert_eq!(ci.lower_bound, 0.0);
        assert_eq!(ci.upper_bound, 0.5);
    }

    #[test]
    fn collapsed_interval_has_zero_width() {
        let ci = ConfidenceInterval::collapsed(1.7, 0.95, 1, MAX_SCORE);
        assert_eq!(ci.width(), 0.0);
        assert_eq!(ci.method, IntervalMethod::Analytical);
    }

    #[test]
    fn quality_levels_are_ordered() {
        assert!(QualityLevel::Insufficient < QualityLevel::Acceptable);
        assert!(QualityLevel::Good < QualityLevel::Excellent);
        let json = serde_json::to_string(&QualityLevel::Good).unwrap();
        assert_eq!(json, "\"GOOD\"");
    }

    #[test]
    fn atomic_score_round_trips_without_weight() {
        let raw = r#"{"question_id":"Q001","base_slot":"D1-Q1","policy_area_id":"PA01",
            "dimension_id":"DIM01","score":2.5,"quality_level":"BUENO"}"#;
        let a: AtomicScore = serde_json::from_str(raw).unwrap();
        assert_eq!(a.weight, None);
        assert_eq!(a.base_slot, "D1-Q1");
    }
}
