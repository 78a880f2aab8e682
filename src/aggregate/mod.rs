//! The four aggregators.
//!
//! Every level follows the same protocol:
//!
//! 1. group the child records
//! 2. check the group size (or missing members) against the insufficiency policy
//! 3. score the group: weighted mean × adaptive penalty, plus an optional interval
//! 4. attach traceability (child ids or child records)
//! 5. attach structural diagnostics
//!
//! Groups within a phase are independent. They are evaluated on the rayon
//! pool when `settings.parallel` is set, each with its own bootstrap seed, and
//! results are always returned in group-key order.

pub mod area;
pub mod cluster;
pub mod dimension;
pub mod holistic;

pub use area::aggregate_areas;
pub use cluster::aggregate_clusters;
pub use dimension::aggregate_dimensions;
pub use holistic::evaluate_macro;

use rayon::prelude::*;

use crate::bootstrap::{normal_quantile, BcaBootstrap};
use crate::context::RunContext;
use crate::dispersion::{normalize_weights, DispersionAnalyzer};
use crate::error::AggregationError;
use crate::model::{AggregationLevel, ConfidenceInterval, IntervalMethod};
use crate::penalty::{AdaptivePenaltyScorer, PenaltyOutcome};
use crate::settings::{AggregationSettings, InsufficiencyPolicy, IntervalSetting};

/// A scored group before it becomes a level-specific record.
#[derive(Debug, Clone)]
pub(crate) struct GroupScore {
    pub outcome: PenaltyOutcome,
    pub interval: Option<ConfidenceInterval>,
    /// Non-fatal problems to record in the run context.
    pub warnings: Vec<String>,
}

/// Level-specific record plus the warnings raised while building it.
pub(crate) struct Evaluated<T> {
    pub key: String,
    pub result: Result<(T, Vec<String>), AggregationError>,
}

// ---------------------------------------------------------------------
//  Scoring
// ---------------------------------------------------------------------

pub(crate) struct GroupScorer<'a> {
    phase: AggregationLevel,
    settings: &'a AggregationSettings,
    analyzer: DispersionAnalyzer,
    scorer: AdaptivePenaltyScorer,
}

impl<'a> GroupScorer<'a> {
    pub fn new(phase: AggregationLevel, settings: &'a AggregationSettings) -> Self {
        let mut dispersion = settings.dispersion.clone();
        dispersion.max_score = settings.max_score;
        Self {
            phase,
            settings,
            analyzer: DispersionAnalyzer::new(dispersion),
            scorer: AdaptivePenaltyScorer::new(settings.penalty.clone()),
        }
    }

    /// Score one group. `raw_weights` need not sum to 1; they are normalised here.
    pub fn score(
        &self,
        key: &str,
        seed: u64,
        scores: &[f64],
        raw_weights: &[f64],
    ) -> Result<GroupScore, AggregationError> {
        let max = self.settings.max_score;
        if let Some(bad) = scores.iter().find(|s| !s.is_finite() || **s < 0.0 || **s > max) {
            return Err(AggregationError::validation(
                self.phase,
                key,
                format!("score {bad} is outside [0, {max}]"),
                "fix the upstream scores; every score must be finite and on the 0-3 scale",
            ));
        }
        if let Some(bad) = raw_weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(AggregationError::validation(
                self.phase,
                key,
                format!("weight {bad} is negative or not finite"),
                "weights must be finite and non-negative",
            ));
        }
        let weights = normalize_weights(raw_weights).ok_or_else(|| {
            AggregationError::validation(
                self.phase,
                key,
                "member weights sum to zero",
                "give at least one member of the group a positive weight",
            )
        })?;

        let outcome = self
            .scorer
            .score(&self.analyzer, scores, Some(&weights))
            .map_err(|e| e.in_group(self.phase, key))?;
        let (interval, warnings) = self.interval(key, seed, scores, &weights, &outcome)?;
        Ok(GroupScore {
            outcome,
            interval,
            warnings,
        })
    }

    /// The penalised weighted mean of a resampled `(score, weight)` set.
    fn penalised(&self, sample: &[(f64, f64)]) -> f64 {
        let scores: Vec<f64> = sample.iter().map(|(s, _)| *s).collect();
        let raw: Vec<f64> = sample.iter().map(|(_, w)| *w).collect();
        let Some(weights) = normalize_weights(&raw) else {
            return f64::NAN;
        };
        self.scorer
            .score(&self.analyzer, &scores, Some(&weights))
            .map(|o| o.adjusted_score)
            .unwrap_or(f64::NAN)
    }

    fn interval(
        &self,
        key: &str,
        seed: u64,
        scores: &[f64],
        weights: &[f64],
        outcome: &PenaltyOutcome,
    ) -> Result<(Option<ConfidenceInterval>, Vec<String>), AggregationError> {
        let conf = &self.settings.confidence;
        let max = self.settings.max_score;
        let level = conf.bootstrap.confidence_level();
        let n = scores.len();
        let point = outcome.adjusted_score;

        if conf.method == IntervalSetting::Disabled {
            return Ok((None, Vec::new()));
        }
        if outcome.metrics.is_constant() {
            return Ok((Some(ConfidenceInterval::collapsed(point, level, n, max)), Vec::new()));
        }

        if conf.method == IntervalSetting::Analytical {
            let z = normal_quantile(1.0 - conf.bootstrap.alpha / 2.0);
            let half = z * outcome.metrics.std_dev * outcome.penalty_factor / (n as f64).sqrt();
            let ci = ConfidenceInterval::bounded(
                point,
                point - half,
                point + half,
                level,
                IntervalMethod::Analytical,
                n,
                max,
            );
            return Ok((Some(ci), Vec::new()));
        }

        let pairs: Vec<(f64, f64)> = scores.iter().copied().zip(weights.iter().copied()).collect();
        let statistic = |sample: &[(f64, f64)]| self.penalised(sample);
        let mut engine = BcaBootstrap::new(conf.bootstrap.clone(), seed);

        if !conf.runs_diagnostics() {
            let u = engine
                .compute(&pairs, &statistic)
                .map_err(|e| e.in_group(self.phase, key))?;
            let ci = ConfidenceInterval::bounded(point, u.ci_lower, u.ci_upper, level, u.method, u.sample_count, max);
            return Ok((Some(ci), Vec::new()));
        }

        let report = engine
            .compute_with_convergence(&pairs, &statistic, &conf.convergence)
            .map_err(|e| e.in_group(self.phase, key))?;
        let u = &report.uncertainty;
        let diagnostics = report.convergence.clone();
        let mut warnings = Vec::new();
        if let Some(mode) = conf.require_reliability {
            if !diagnostics.is_reliable(mode) {
                let mut flags = diagnostics.pathology_flags.clone();
                flags.push(format!("{} of 5 convergence checks passed", diagnostics.checks.passed()));
                match self.settings.insufficiency_policy {
                    InsufficiencyPolicy::StrictAbort => {
                        return Err(AggregationError::Convergence {
                            phase: self.phase,
                            group: key.to_string(),
                            flags,
                            remediation: "raise confidence.bootstrap.iterations, relax require_reliability, or inspect the group for bimodal scores".to_string(),
                        });
                    }
                    InsufficiencyPolicy::WarnAndDegrade => {
                        warnings.push(format!("bootstrap interval is unreliable: {}", flags.join("; ")));
                    }
                }
            }
        }
        let ci = ConfidenceInterval::bounded(point, u.ci_lower, u.ci_upper, level, u.method, u.sample_count, max)
            .with_convergence(diagnostics);
        Ok((Some(ci), warnings))
    }
}

// ---------------------------------------------------------------------
//  Protocol helpers
// ---------------------------------------------------------------------

/// Apply the insufficiency policy to an empty phase input.
pub(crate) fn check_nonempty(
    phase: AggregationLevel,
    len: usize,
    settings: &AggregationSettings,
    ctx: &mut RunContext,
) -> Result<bool, AggregationError> {
    if len > 0 {
        return Ok(true);
    }
    match settings.insufficiency_policy {
        InsufficiencyPolicy::StrictAbort => Err(AggregationError::empty_phase(phase)),
        InsufficiencyPolicy::WarnAndDegrade => {
            ctx.warn(phase, "*", format!("{phase} phase received no input; producing no output"));
            Ok(false)
        }
    }
}

/// Error for a group smaller than the configured minimum, if it is.
pub(crate) fn check_group_size(
    phase: AggregationLevel,
    key: &str,
    size: usize,
    settings: &AggregationSettings,
) -> Result<(), AggregationError> {
    let min = settings.min_group_size.for_level(phase).max(1);
    if size >= min {
        return Ok(());
    }
    Err(AggregationError::phase_validation(
        phase,
        vec![key.to_string()],
        format!("group {key} has {size} member(s); at least {min} required"),
        format!("supply the missing {phase} inputs or lower min_group_size.{phase}"),
    ))
}

/// Evaluate groups, in parallel when enabled. Output order equals input order.
pub(crate) fn evaluate<I, O, F>(parallel: bool, jobs: Vec<I>, f: F) -> Vec<O>
where
    I: Send,
    O: Send,
    F: Fn(I) -> O + Sync + Send,
{
    if parallel {
        jobs.into_par_iter().map(f).collect()
    } else {
        jobs.into_iter().map(f).collect()
    }
}

/// Fold evaluated groups in key order: strict policy returns the first
/// error, degrade policy records it and drops the group.
pub(crate) fn collect_groups<T>(
    phase: AggregationLevel,
    evaluated: Vec<Evaluated<T>>,
    settings: &AggregationSettings,
    ctx: &mut RunContext,
) -> Result<Vec<T>, AggregationError> {
    let mut out = Vec::with_capacity(evaluated.len());
    for Evaluated { key, result } in evaluated {
        match result {
            Ok((record, warnings)) => {
                for w in warnings {
                    ctx.warn(phase, key.clone(), w);
                }
                out.push(record);
            }
            Err(err) => match settings.insufficiency_policy {
                InsufficiencyPolicy::StrictAbort => return Err(err),
                InsufficiencyPolicy::WarnAndDegrade => {
                    ctx.warn(phase, key, format!("group skipped ({}): {err}", err.code()));
                }
            },
        }
    }
    Ok(out)
}
