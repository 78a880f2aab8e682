//! Question → dimension → area → cluster → macro aggregation run.
//!
//! Phases are strictly sequential: each one consumes the complete output of
//! the previous phase, because its grouping keys come from that output.
//! Every boundary is checked by the [`PipelineValidator`].
//!
//! Usage:
//! ```bash
//! plan-aggregator aggregate --scores scores.json --settings settings.json --out report.json
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{aggregate_areas, aggregate_clusters, aggregate_dimensions, evaluate_macro};
use crate::context::{RunContext, RunWarning};
use crate::error::AggregationError;
use crate::model::{AreaScore, AtomicScore, ClusterScore, DimensionScore, MacroScore};
use crate::settings::{AggregationSettings, InsufficiencyPolicy, SettingsError};
use crate::validator::{PipelineValidator, ValidationMode, ValidationReport};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Failed to serialize inputs: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub run_seed: u64,
    /// blake3 of the serialized atomic scores and settings.
    pub input_fingerprint: String,
    pub input_count: usize,
    pub dimension_scores: Vec<DimensionScore>,
    pub area_scores: Vec<AreaScore>,
    pub cluster_scores: Vec<ClusterScore>,
    pub macro_score: MacroScore,
    pub validation: ValidationReport,
    pub warnings: Vec<RunWarning>,
}

impl AggregationReport {
    pub fn passed(&self) -> bool {
        self.validation.passed()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone)]
pub struct AggregationPipeline {
    settings: AggregationSettings,
    validation: ValidationMode,
}

impl AggregationPipeline {
    /// Validates the settings. Strict policy raises at the first failing
    /// boundary; degrade policy collects every boundary into the report.
    pub fn new(settings: AggregationSettings) -> Result<Self, PipelineError> {
        settings.validate()?;
        let validation = match settings.insufficiency_policy {
            InsufficiencyPolicy::StrictAbort => ValidationMode::Raise,
            InsufficiencyPolicy::WarnAndDegrade => ValidationMode::Collect,
        };
        Ok(Self {
            settings,
            validation,
        })
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation = mode;
        self
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    pub fn run(&self, atomic_scores: &[AtomicScore]) -> Result<AggregationReport, PipelineError> {
        let settings = &self.settings;
        let mut ctx = RunContext::new(settings.seed);
        let scores_json = serde_json::to_vec(atomic_scores)?;
        let settings_json = serde_json::to_vec(settings)?;
        let input_fingerprint = ctx
            .fingerprint_inputs(&[scores_json.as_slice(), settings_json.as_slice()])
            .to_string();
        let validator = PipelineValidator::new(self.validation, settings.max_score);
        let mut validation = ValidationReport::default();

        info!(
            inputs = atomic_scores.len(),
            seed = settings.seed,
            fingerprint = %input_fingerprint,
            "aggregation started"
        );

        // --- Phase 1: Dimension ---
        let dimension_scores = aggregate_dimensions(atomic_scores, settings, &mut ctx)?;
        validation
            .phases
            .push(validator.validate_dimensions(atomic_scores.len(), &dimension_scores)?);

        // --- Phase 2: Area ---
        let area_scores = aggregate_areas(&dimension_scores, settings, &mut ctx)?;
        validation
            .phases
            .push(validator.validate_areas(dimension_scores.len(), &area_scores)?);

        // --- Phase 3: Cluster ---
        let cluster_scores = aggregate_clusters(&area_scores, settings, &mut ctx)?;
        validation
            .phases
            .push(validator.validate_clusters(area_scores.len(), &cluster_scores)?);

        // --- Phase 4: Macro ---
        let macro_score = evaluate_macro(&cluster_scores, &area_scores, &dimension_scores, settings, &mut ctx)?;
        validation
            .phases
            .push(validator.validate_macro(cluster_scores.len(), &macro_score)?);

        info!(
            score = macro_score.score,
            quality = %macro_score.quality_level,
            passed = validation.passed(),
            warnings = ctx.warnings().len(),
            "aggregation done"
        );

        Ok(AggregationReport {
            run_seed: ctx.seed(),
            input_fingerprint,
            input_count: atomic_scores.len(),
            dimension_scores,
            area_scores,
            cluster_scores,
            macro_score,
            validation,
            warnings: ctx.into_warnings(),
        })
    }
}

/// Convenience: validate settings and run once.
pub fn run_aggregation(
    atomic_scores: &[AtomicScore],
    settings: AggregationSettings,
) -> Result<AggregationReport, PipelineError> {
    AggregationPipeline::new(settings)?.run(atomic_scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::IntervalSetting;

    fn atomic(settings: &AggregationSettings) -> Vec<AtomicScore> {
        let mut out = Vec::new();
        for pa in settings.area_ids() {
            for dim in settings.dimension_ids() {
                for q in 1..=3 {
                    let score = 1.0 + (q as f64) * 0.4;
                    out.push(AtomicScore::new(format!("{pa}-{dim}-Q{q}"), pa.as_str(), dim.as_str(), score));
                }
            }
        }
        out
    }

    #[test]
    fn strict_run_passes_on_complete_input() {
        let mut s = AggregationSettings::canonical();
        s.confidence.method = IntervalSetting::Analytical;
        let input = atomic(&s);
        let report = run_aggregation(&input, s).unwrap();
        assert!(report.passed());
        assert_eq!(report.dimension_scores.len(), 60);
        assert_eq!(report.area_scores.len(), 10);
        assert_eq!(report.cluster_scores.len(), 4);
        assert_eq!(report.validation.phases.len(), 4);
        assert_eq!(report.input_count, 180);
        assert_eq!(report.input_fingerprint.len(), 64);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn strict_run_raises_on_incomplete_area() {
        let mut s = AggregationSettings::canonical();
        s.confidence.method = IntervalSetting::Disabled;
        let input: Vec<AtomicScore> = atomic(&s)
            .into_iter()
            .filter(|a| !(a.policy_area_id == "PA04" && a.dimension_id == "DIM03"))
            .collect();
        let err = match run_aggregation(&input, s) {
            Err(PipelineError::Aggregation(err)) => err,
            other => panic!("expected aggregation error, got {other:?}"),
        };
        assert_eq!(err.code(), "aggregation_validation_error");
        assert_eq!(err.group_keys(), vec!["PA04".to_string()]);
    }

    #[test]
    fn degrade_run_collects_validation_failures() {
        let mut s = AggregationSettings::canonical();
        s.confidence.method = IntervalSetting::Disabled;
        s.insufficiency_policy = InsufficiencyPolicy::WarnAndDegrade;
        let input: Vec<AtomicScore> = atomic(&s)
            .into_iter()
            .filter(|a| !(a.policy_area_id == "PA04" && a.dimension_id == "DIM03"))
            .collect();
        let report = run_aggregation(&input, s).unwrap();
        assert!(!report.passed());
        let failed: Vec<_> = report.validation.failures().map(|p| p.phase).collect();
        assert_eq!(failed, vec![crate::model::AggregationLevel::Area]);
        assert_eq!(report.macro_score.strategic_alignment.cell_count(), 59);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn invalid_settings_are_rejected_up_front() {
        let s = AggregationSettings::default();
        assert!(matches!(
            AggregationPipeline::new(s),
            Err(PipelineError::Settings(_))
        ));
    }
}
