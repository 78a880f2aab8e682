//! Question → dimension aggregation.

use tracing::{debug, info};

use super::{check_group_size, check_nonempty, collect_groups, evaluate, Evaluated, GroupScorer};
use crate::context::RunContext;
use crate::error::AggregationError;
use crate::grouping::{group_by, GroupField};
use crate::model::{AggregationLevel, AtomicScore, DimensionScore};
use crate::settings::AggregationSettings;

const PHASE: AggregationLevel = AggregationLevel::Dimension;

/// Group atomic scores by `(policy_area_id, dimension_id)` and score each cell.
pub fn aggregate_dimensions(
    atomic_scores: &[AtomicScore],
    settings: &AggregationSettings,
    ctx: &mut RunContext,
) -> Result<Vec<DimensionScore>, AggregationError> {
    if !check_nonempty(PHASE, atomic_scores.len(), settings, ctx)? {
        return Ok(Vec::new());
    }

    let mut keys = settings.group_by.dimension.clone();
    keys.sort();
    if keys != [GroupField::PolicyAreaId, GroupField::DimensionId] {
        return Err(AggregationError::validation(
            PHASE,
            "*",
            format!(
                "group_by.dimension is {:?}; dimension scores are keyed by policy area and dimension",
                settings.group_by.dimension
            ),
            "set group_by.dimension to [\"policy_area_id\", \"dimension_id\"]",
        ));
    }

    let groups = group_by(atomic_scores, &settings.group_by.dimension).map_err(|e| {
        AggregationError::validation(
            PHASE,
            "*",
            e.to_string(),
            "every atomic score needs a non-empty policy_area_id and dimension_id",
        )
    })?;

    let jobs: Vec<_> = groups
        .into_iter()
        .map(|(key, members)| {
            let key = key.to_string();
            let seed = ctx.group_seed(PHASE, &key);
            (key, seed, members)
        })
        .collect();

    let scorer = GroupScorer::new(PHASE, settings);
    let evaluated = evaluate(settings.parallel, jobs, |(key, seed, members)| {
        let result = check_group_size(PHASE, &key, members.len(), settings).and_then(|()| {
            let scores: Vec<f64> = members.iter().map(|a| a.score).collect();
            let weights: Vec<f64> = members.iter().map(|a| a.weight.unwrap_or(1.0)).collect();
            let g = scorer.score(&key, seed, &scores, &weights)?;
            // Non-empty: grouping never yields an empty group.
            let first = members[0];
            let record = DimensionScore {
                policy_area_id: first.policy_area_id.clone(),
                dimension_id: first.dimension_id.clone(),
                score: g.outcome.adjusted_score,
                quality_level: settings.classify(g.outcome.adjusted_score),
                contributing_question_ids: members.iter().map(|a| a.question_id.clone()).collect(),
                dispersion_metrics: g.outcome.metrics,
                penalty_factor: g.outcome.penalty_factor,
                confidence_interval: g.interval,
            };
            debug!(
                phase = %PHASE,
                group = %key,
                members = members.len(),
                score = record.score,
                penalty = record.penalty_factor,
                "dimension scored"
            );
            Ok((record, g.warnings))
        });
        Evaluated { key, result }
    });

    let out = collect_groups(PHASE, evaluated, settings, ctx)?;
    info!(phase = %PHASE, groups = out.len(), inputs = atomic_scores.len(), "phase complete");
    Ok(out)
}
