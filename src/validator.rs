//! Phase-boundary checks.
//!
//! Each phase's output is checked for:
//! - non-empty output when the input was non-empty
//! - scores within `[0, max_score]` and intervals that contain their point
//! - non-empty traceability (child ids or child records)
//! - hermeticity, for the area and macro phases
//!
//! In [`ValidationMode::Raise`] the first failing phase returns an
//! [`AggregationError::AggregationValidation`]. In [`ValidationMode::Collect`]
//! every phase is recorded in a [`ValidationReport`] so all problems can be
//! reported before the run is failed.

use serde::{Deserialize, Serialize};

use crate::error::AggregationError;
use crate::model::{AggregationLevel, AreaScore, ClusterScore, ConfidenceInterval, DimensionScore, MacroScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    Raise,
    Collect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub group: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseValidation {
    pub phase: AggregationLevel,
    pub passed: bool,
    pub input_count: usize,
    pub output_count: usize,
    pub violations: Vec<Violation>,
}

impl PhaseValidation {
    pub fn diagnosis(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.group, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn to_error(&self) -> AggregationError {
        let mut keys: Vec<String> = self.violations.iter().map(|v| v.group.clone()).collect();
        keys.dedup();
        AggregationError::phase_validation(
            self.phase,
            keys,
            self.diagnosis(),
            remediation(self.phase),
        )
    }
}

fn remediation(phase: AggregationLevel) -> String {
    match phase {
        AggregationLevel::Dimension => "check atomic score ranges and that every (area, dimension) cell has questions".into(),
        AggregationLevel::Area => "supply every expected dimension for each area, or remove unexpected ones".into(),
        AggregationLevel::Cluster => "check cluster membership against the area scores produced".into(),
        AggregationLevel::Macro => "ensure every configured cluster was scored".into(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub phases: Vec<PhaseValidation>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.phases.iter().all(|p| p.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PhaseValidation> {
        self.phases.iter().filter(|p| !p.passed)
    }

    /// The first failing phase as an error, if any.
    pub fn into_result(self) -> Result<(), AggregationError> {
        match self.phases.iter().find(|p| !p.passed) {
            Some(p) => Err(p.to_error()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineValidator {
    pub mode: ValidationMode,
    pub max_score: f64,
}

impl PipelineValidator {
    pub fn new(mode: ValidationMode, max_score: f64) -> Self {
        Self { mode, max_score }
    }

    pub fn validate_dimensions(
        &self,
        input_count: usize,
        output: &[DimensionScore],
    ) -> Result<PhaseValidation, AggregationError> {
        let mut v = Vec::new();
        for d in output {
            let key = format!("{}/{}", d.policy_area_id, d.dimension_id);
            self.check_score(&mut v, &key, d.score, d.confidence_interval.as_ref());
            if d.contributing_question_ids.is_empty() {
                v.push(violation(&key, "no contributing question ids"));
            }
        }
        self.finish(AggregationLevel::Dimension, input_count, output.len(), v)
    }

    pub fn validate_areas(
        &self,
        input_count: usize,
        output: &[AreaScore],
    ) -> Result<PhaseValidation, AggregationError> {
        let mut v = Vec::new();
        for a in output {
            self.check_score(&mut v, &a.area_id, a.score, a.confidence_interval.as_ref());
            if a.dimension_scores.is_empty() {
                v.push(violation(&a.area_id, "no dimension scores"));
            }
            if !a.hermeticity.is_hermetic {
                v.push(violation(&a.area_id, &format!("not hermetic ({})", a.hermeticity.summary())));
            }
        }
        self.finish(AggregationLevel::Area, input_count, output.len(), v)
    }

    pub fn validate_clusters(
        &self,
        input_count: usize,
        output: &[ClusterScore],
    ) -> Result<PhaseValidation, AggregationError> {
        let mut v = Vec::new();
        for c in output {
            self.check_score(&mut v, &c.cluster_id, c.score, c.confidence_interval.as_ref());
            if c.area_scores.is_empty() {
                v.push(violation(&c.cluster_id, "no area scores"));
            }
            if !(0.0..=1.0).contains(&c.coherence) {
                v.push(violation(&c.cluster_id, &format!("coherence {} outside [0, 1]", c.coherence)));
            }
        }
        self.finish(AggregationLevel::Cluster, input_count, output.len(), v)
    }

    pub fn validate_macro(
        &self,
        input_count: usize,
        output: &MacroScore,
    ) -> Result<PhaseValidation, AggregationError> {
        let mut v = Vec::new();
        let key = "macro";
        self.check_score(&mut v, key, output.score, output.confidence_interval.as_ref());
        if output.cluster_scores.is_empty() {
            v.push(violation(key, "no cluster scores"));
        }
        if !output.hermeticity.is_hermetic {
            v.push(violation(key, &format!("not hermetic ({})", output.hermeticity.summary())));
        }
        self.finish(AggregationLevel::Macro, input_count, 1, v)
    }

    fn check_score(&self, v: &mut Vec<Violation>, key: &str, score: f64, ci: Option<&ConfidenceInterval>) {
        if !score.is_finite() || score < 0.0 || score > self.max_score {
            v.push(violation(key, &format!("score {score} outside [0, {}]", self.max_score)));
        }
        if let Some(ci) = ci {
            if !(ci.lower_bound <= ci.point_estimate && ci.point_estimate <= ci.upper_bound) {
                v.push(violation(
                    key,
                    &format!(
                        "interval [{}, {}] does not contain {}",
                        ci.lower_bound, ci.upper_bound, ci.point_estimate
                    ),
                ));
            }
        }
    }

    fn finish(
        &self,
        phase: AggregationLevel,
        input_count: usize,
        output_count: usize,
        mut violations: Vec<Violation>,
    ) -> Result<PhaseValidation, AggregationError> {
        if input_count > 0 && output_count == 0 {
            violations.insert(0, violation("*", &format!("{input_count} input record(s) produced no output")));
        }
        let result = PhaseValidation {
            phase,
            passed: violations.is_empty(),
            input_count,
            output_count,
            violations,
        };
        if self.mode == ValidationMode::Raise && !result.passed {
            return Err(result.to_error());
        }
        Ok(result)
    }
}

fn violation(group: &str, message: &str) -> Violation {
    Violation {
        group: group.to_string(),
        message: message.to_string(),
    }
}
