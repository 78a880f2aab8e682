//! Dimension → policy-area aggregation with hermeticity diagnosis.

use tracing::{debug, info};

use super::{check_group_size, check_nonempty, collect_groups, evaluate, Evaluated, GroupScorer};
use crate::context::RunContext;
use crate::error::AggregationError;
use crate::grouping::{group_by, GroupField};
use crate::hermeticity::HermeticityDiagnosis;
use crate::model::{AggregationLevel, AreaScore, DimensionScore};
use crate::settings::{AggregationSettings, InsufficiencyPolicy};

const PHASE: AggregationLevel = AggregationLevel::Area;

/// Group dimension scores by policy area.
///
/// Every dimension present is aggregated; the hermeticity diagnosis on each
/// record says which expected dimensions were missing or unexpected.
pub fn aggregate_areas(
    dimension_scores: &[DimensionScore],
    settings: &AggregationSettings,
    ctx: &mut RunContext,
) -> Result<Vec<AreaScore>, AggregationError> {
    if !check_nonempty(PHASE, dimension_scores.len(), settings, ctx)? {
        return Ok(Vec::new());
    }
    if settings.group_by.area != [GroupField::PolicyAreaId] {
        return Err(AggregationError::validation(
            PHASE,
            "*",
            format!("group_by.area is {:?}", settings.group_by.area),
            "set group_by.area to [\"policy_area_id\"]",
        ));
    }

    let groups = group_by(dimension_scores, &settings.group_by.area).map_err(|e| {
        AggregationError::validation(PHASE, "*", e.to_string(), "every dimension score needs a policy_area_id")
    })?;
    let expected = settings.dimension_ids();

    let mut jobs = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let area_id = key.to_string();
        let area_name = match settings.area_name(&area_id) {
            Some(name) => name.to_string(),
            None => match settings.insufficiency_policy {
                InsufficiencyPolicy::StrictAbort => {
                    return Err(AggregationError::validation(
                        PHASE,
                        area_id.as_str(),
                        format!("policy area {area_id} is not in the configured universe"),
                        "add the area to settings.policy_areas or drop its scores",
                    ));
                }
                InsufficiencyPolicy::WarnAndDegrade => {
                    ctx.warn(PHASE, area_id.as_str(), "unknown policy area; using its id as name");
                    area_id.clone()
                }
            },
        };
        let seed = ctx.group_seed(PHASE, &area_id);
        jobs.push((area_id, area_name, seed, members));
    }

    let scorer = GroupScorer::new(PHASE, settings);
    let evaluated = evaluate(settings.parallel, jobs, |(area_id, area_name, seed, members)| {
        let result = check_group_size(PHASE, &area_id, members.len(), settings).and_then(|()| {
            let hermeticity = HermeticityDiagnosis::diagnose(
                expected.iter().map(String::as_str),
                members.iter().map(|d| d.dimension_id.as_str()),
                "dimension",
                &area_id,
            );
            let scores: Vec<f64> = members.iter().map(|d| d.score).collect();
            let weights: Vec<f64> = members
                .iter()
                .map(|d| settings.dimension_weight(&d.dimension_id))
                .collect();
            let g = scorer.score(&area_id, seed, &scores, &weights)?;

            let mut warnings = g.warnings;
            if !hermeticity.is_hermetic {
                warnings.push(format!("not hermetic: {}", hermeticity.summary()));
            }
            debug!(
                phase = %PHASE,
                group = %area_id,
                dimensions = members.len(),
                score = g.outcome.adjusted_score,
                hermetic = hermeticity.is_hermetic,
                "area scored"
            );
            let record = AreaScore {
                area_name,
                score: g.outcome.adjusted_score,
                quality_level: settings.classify(g.outcome.adjusted_score),
                dimension_scores: members.into_iter().cloned().collect(),
                dispersion_metrics: g.outcome.metrics,
                penalty_factor: g.outcome.penalty_factor,
                hermeticity,
                confidence_interval: g.interval,
                area_id: area_id.clone(),
            };
            Ok((record, warnings))
        });
        Evaluated { key: area_id, result }
    });

    let out = collect_groups(PHASE, evaluated, settings, ctx)?;
    info!(phase = %PHASE, groups = out.len(), inputs = dimension_scores.len(), "phase complete");
    Ok(out)
}
