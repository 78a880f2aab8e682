//! Cluster → macro evaluation.
//!
//! The macro phase sees the cluster scores and also the raw area and
//! dimension lists: the strategic alignment grid is built from the
//! dimension records, and both lists are cross-checked against the cluster
//! tree so a record that fell out of the hierarchy is reported.

use std::collections::BTreeSet;

use tracing::info;

use super::{check_group_size, GroupScorer};
use crate::alignment::StrategicAlignmentAnalyzer;
use crate::context::RunContext;
use crate::error::AggregationError;
use crate::hermeticity::HermeticityDiagnosis;
use crate::model::{AggregationLevel, AreaScore, ClusterScore, DimensionScore, MacroScore};
use crate::settings::AggregationSettings;

const PHASE: AggregationLevel = AggregationLevel::Macro;
const MACRO_KEY: &str = "macro";

/// Produce the single holistic score.
///
/// Fails on an empty cluster list regardless of policy: there is no partial
/// macro score.
pub fn evaluate_macro(
    cluster_scores: &[ClusterScore],
    area_scores: &[AreaScore],
    dimension_scores: &[DimensionScore],
    settings: &AggregationSettings,
    ctx: &mut RunContext,
) -> Result<MacroScore, AggregationError> {
    if cluster_scores.is_empty() {
        return Err(AggregationError::empty_phase(PHASE));
    }
    check_group_size(PHASE, MACRO_KEY, cluster_scores.len(), settings)?;

    for warning in cross_check(cluster_scores, area_scores, dimension_scores) {
        ctx.warn(PHASE, MACRO_KEY, warning);
    }

    let hermeticity = HermeticityDiagnosis::diagnose(
        settings.clusters.iter().map(|c| c.id.as_str()),
        cluster_scores.iter().map(|c| c.cluster_id.as_str()),
        "cluster",
        MACRO_KEY,
    );
    if !hermeticity.is_hermetic {
        ctx.warn(PHASE, MACRO_KEY, format!("not hermetic: {}", hermeticity.summary()));
    }

    let scores: Vec<f64> = cluster_scores.iter().map(|c| c.score).collect();
    let weights: Vec<f64> = cluster_scores
        .iter()
        .map(|c| settings.cluster_weight(&c.cluster_id))
        .collect();
    let seed = ctx.group_seed(PHASE, MACRO_KEY);
    let g = GroupScorer::new(PHASE, settings).score(MACRO_KEY, seed, &scores, &weights)?;
    for warning in g.warnings {
        ctx.warn(PHASE, MACRO_KEY, warning);
    }

    let cross_cutting_coherence = (cluster_scores.iter().map(|c| c.coherence).sum::<f64>()
        / cluster_scores.len() as f64)
        .clamp(0.0, 1.0);

    let strategic_alignment = StrategicAlignmentAnalyzer::new(
        settings.area_ids(),
        settings.dimension_ids(),
        settings.acceptable_level,
        settings.max_score,
    )
    .analyze(area_scores, dimension_scores);

    let score = g.outcome.adjusted_score;
    info!(
        phase = %PHASE,
        clusters = cluster_scores.len(),
        score,
        coverage = strategic_alignment.coverage_rate,
        hermetic = hermeticity.is_hermetic,
        "phase complete"
    );

    Ok(MacroScore {
        score,
        quality_level: settings.classify(score),
        cluster_scores: cluster_scores.to_vec(),
        cross_cutting_coherence,
        strategic_alignment,
        dispersion_metrics: g.outcome.metrics,
        penalty_factor: g.outcome.penalty_factor,
        hermeticity,
        confidence_interval: g.interval,
    })
}

/// Consistency between the cluster tree and the flat area/dimension lists.
fn cross_check(
    cluster_scores: &[ClusterScore],
    area_scores: &[AreaScore],
    dimension_scores: &[DimensionScore],
) -> Vec<String> {
    let mut warnings = Vec::new();
    let listed: BTreeSet<&str> = area_scores.iter().map(|a| a.area_id.as_str()).collect();
    let clustered: BTreeSet<&str> = cluster_scores
        .iter()
        .flat_map(|c| c.area_scores.iter().map(|a| a.area_id.as_str()))
        .collect();

    for id in clustered.difference(&listed) {
        warnings.push(format!("area {id} appears in a cluster but not in the area list"));
    }
    for id in listed.difference(&clustered) {
        warnings.push(format!("area {id} is not a member of any scored cluster"));
    }
    let orphans: BTreeSet<&str> = dimension_scores
        .iter()
        .map(|d| d.policy_area_id.as_str())
        .filter(|pa| !listed.contains(pa))
        .collect();
    for id in orphans {
        warnings.push(format!("dimension scores reference area {id}, which has no area score"));
    }
    warnings
}
