//! Policy-area → cluster aggregation by declared membership.

use tracing::{debug, info};

use super::{check_group_size, check_nonempty, collect_groups, evaluate, Evaluated, GroupScorer};
use crate::context::RunContext;
use crate::error::AggregationError;
use crate::grouping::group_by_membership;
use crate::model::{AggregationLevel, AreaScore, ClusterScore};
use crate::settings::{AggregationSettings, InsufficiencyPolicy};

const PHASE: AggregationLevel = AggregationLevel::Cluster;

/// Group area scores by the cluster definitions in `settings.clusters`.
///
/// A declared member with no area score is an error under strict policy;
/// when degrading, the cluster is scored over the members that are present.
pub fn aggregate_clusters(
    area_scores: &[AreaScore],
    settings: &AggregationSettings,
    ctx: &mut RunContext,
) -> Result<Vec<ClusterScore>, AggregationError> {
    if !check_nonempty(PHASE, area_scores.len(), settings, ctx)? {
        return Ok(Vec::new());
    }

    let memberships: Vec<(String, Vec<String>)> = settings
        .clusters
        .iter()
        .map(|c| (c.id.clone(), c.policy_area_ids.clone()))
        .collect();
    let mut groups = group_by_membership(area_scores, &memberships, |a| a.area_id.as_str());

    let mut jobs = Vec::with_capacity(settings.clusters.len());
    for def in &settings.clusters {
        let Some(group) = groups.remove(&def.id) else {
            continue;
        };
        if !group.missing.is_empty() {
            let diagnosis = format!(
                "cluster {} is missing member area(s) {}",
                def.id,
                group.missing.join(", ")
            );
            match settings.insufficiency_policy {
                InsufficiencyPolicy::StrictAbort => {
                    return Err(AggregationError::phase_validation(
                        PHASE,
                        vec![def.id.clone()],
                        diagnosis,
                        "supply area scores for every declared cluster member, or fix the cluster definition",
                    ));
                }
                InsufficiencyPolicy::WarnAndDegrade => ctx.warn(PHASE, def.id.as_str(), diagnosis),
            }
        }
        let seed = ctx.group_seed(PHASE, &def.id);
        jobs.push((def, seed, group));
    }

    let scorer = GroupScorer::new(PHASE, settings);
    let evaluated = evaluate(settings.parallel, jobs, |(def, seed, group)| {
        let key = def.id.clone();
        let result = check_group_size(PHASE, &key, group.members.len(), settings).and_then(|()| {
            let scores: Vec<f64> = group.members.iter().map(|a| a.score).collect();
            let weights: Vec<f64> = group
                .members
                .iter()
                .map(|a| def.area_weights.get(&a.area_id).copied().unwrap_or(1.0))
                .collect();
            let g = scorer.score(&key, seed, &scores, &weights)?;
            let coherence = (1.0 - g.outcome.metrics.dispersion_index).clamp(0.0, 1.0);
            debug!(
                phase = %PHASE,
                group = %key,
                areas = group.members.len(),
                score = g.outcome.adjusted_score,
                coherence,
                "cluster scored"
            );
            let record = ClusterScore {
                cluster_id: def.id.clone(),
                cluster_name: if def.name.is_empty() { def.id.clone() } else { def.name.clone() },
                score: g.outcome.adjusted_score,
                quality_level: settings.classify(g.outcome.adjusted_score),
                coherence,
                area_scores: group.members.into_iter().cloned().collect(),
                dispersion_metrics: g.outcome.metrics,
                penalty_factor: g.outcome.penalty_factor,
                missing_area_ids: group.missing,
                confidence_interval: g.interval,
            };
            Ok((record, g.warnings))
        });
        Evaluated { key, result }
    });

    let mut out = collect_groups(PHASE, evaluated, settings, ctx)?;
    out.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
    info!(phase = %PHASE, groups = out.len(), inputs = area_scores.len(), "phase complete");
    Ok(out)
}
