use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use plan_aggregator::dispersion::{DispersionAnalyzer, DispersionScenario};
use plan_aggregator::hermeticity::{HermeticityDiagnosis, Severity};
use plan_aggregator::penalty::AdaptivePenaltyScorer;
use plan_aggregator::settings::IntervalSetting;
use plan_aggregator::{
    aggregate_areas, aggregate_clusters, aggregate_dimensions, evaluate_macro, run_aggregation,
    AggregationError, AggregationLevel, AggregationPipeline, AggregationSettings, AtomicScore,
    RunContext, MAX_SCORE,
};

/// 10 areas × 6 dimensions × 5 questions with seeded scores in `[lo, 3]`.
fn questionnaire_scores(seed: u64, lo: f64) -> Vec<AtomicScore> {
    let settings = AggregationSettings::canonical();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(300);
    let mut n = 0;
    for pa in settings.area_ids() {
        for dim in settings.dimension_ids() {
            for q in 1..=5 {
                n += 1;
                let mut a = AtomicScore::new(format!("Q{n:03}"), pa.as_str(), dim.as_str(), rng.gen_range(lo..=MAX_SCORE));
                a.base_slot = format!("{dim}-Q{q}");
                out.push(a);
            }
        }
    }
    out
}

fn fast_settings() -> AggregationSettings {
    let mut s = AggregationSettings::canonical();
    s.confidence.bootstrap.iterations = 400;
    s
}

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

#[test]
fn identical_inputs_give_identical_reports() {
    let input = questionnaire_scores(7, 0.0);
    let a = run_aggregation(&input, fast_settings()).unwrap();
    let b = run_aggregation(&input, fast_settings()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let input = questionnaire_scores(11, 0.0);
    let mut seq = fast_settings();
    seq.parallel = false;
    let par = run_aggregation(&input, fast_settings()).unwrap();
    let seq = run_aggregation(&input, seq).unwrap();
    assert_eq!(par.macro_score, seq.macro_score);
    assert_eq!(par.dimension_scores, seq.dimension_scores);
}

#[test]
fn converged_group_is_not_penalised() {
    let analyzer = DispersionAnalyzer::default();
    let outcome = AdaptivePenaltyScorer::default()
        .score(&analyzer, &[2.5, 2.5, 2.5, 2.5], None)
        .unwrap();
    assert_eq!(outcome.metrics.coefficient_of_variation, 0.0);
    assert_eq!(outcome.metrics.dispersion_index, 0.0);
    assert_eq!(outcome.metrics.scenario, DispersionScenario::Convergence);
    assert_eq!(outcome.penalty_factor, 1.0);
    assert_eq!(outcome.adjusted_score, 2.5);
}

#[test]
fn extreme_dispersion_is_penalised() {
    let analyzer = DispersionAnalyzer::default();
    let outcome = AdaptivePenaltyScorer::default()
        .score(&analyzer, &[0.0, 1.0, 2.0, 3.0], None)
        .unwrap();
    assert_eq!(outcome.metrics.dispersion_index, 1.0);
    assert_eq!(outcome.metrics.scenario, DispersionScenario::ExtremeDispersion);
    assert!(outcome.penalty_factor < 0.75);
    assert!(outcome.penalty_factor >= 0.5);
}

#[test]
fn weighted_mean_is_exact() {
    let analyzer = DispersionAnalyzer::default();
    let outcome = AdaptivePenaltyScorer::default()
        .score(&analyzer, &[1.0, 2.0, 2.0, 3.0], Some(&[0.1, 0.3, 0.3, 0.3]))
        .unwrap();
    assert!(approx_eq(outcome.weighted_mean, 2.2, 1e-12));
}

#[test]
fn single_question_dimension_collapses() {
    let input = vec![AtomicScore::new("Q1", "PA01", "DIM01", 1.75)];
    let dims = aggregate_dimensions(&input, &AggregationSettings::canonical(), &mut RunContext::new(42)).unwrap();
    let d = &dims[0];
    assert_eq!(d.dispersion_metrics.variance, 0.0);
    assert_eq!(d.penalty_factor, 1.0);
    let ci = d.confidence_interval.as_ref().unwrap();
    assert_eq!((ci.lower_bound, ci.upper_bound), (1.75, 1.75));
}

#[test]
fn hermeticity_flags_missing_dimension() {
    let all = ["DIM01", "DIM02", "DIM03", "DIM04", "DIM05", "DIM06"];
    let full = HermeticityDiagnosis::diagnose(all, all, "dimension", "PA01");
    assert!(full.is_hermetic);
    let short = HermeticityDiagnosis::diagnose(all, all[..5].iter().copied(), "dimension", "PA01");
    assert!(!short.is_hermetic);
    assert_eq!(short.missing_ids.iter().map(String::as_str).collect::<Vec<_>>(), vec!["DIM06"]);
    assert_eq!(short.severity, Severity::Critical);
}

#[test]
fn full_questionnaire_covers_sixty_cells() {
    let report = run_aggregation(&questionnaire_scores(3, 0.0), fast_settings()).unwrap();
    let alignment = &report.macro_score.strategic_alignment;
    assert_eq!(alignment.coverage_rate, 1.0);
    assert_eq!(alignment.cell_count(), 60);
    assert_eq!(alignment.weakest_dimensions.len(), 3);
    assert_eq!(alignment.strongest_dimensions.len(), 3);
    assert!(alignment.weakest_dimensions[0].mean_score <= alignment.strongest_dimensions[0].mean_score);
    assert!((0.0..=1.0).contains(&alignment.balance_score));
}

#[test]
fn macro_score_stays_in_range() {
    for seed in 0..5 {
        let report = run_aggregation(&questionnaire_scores(seed, 0.0), fast_settings()).unwrap();
        let m = &report.macro_score;
        assert!(m.score >= 0.0 && m.score <= MAX_SCORE, "seed {seed}: {}", m.score);
        assert!((0.0..=1.0).contains(&m.cross_cutting_coherence));
        let ci = m.confidence_interval.as_ref().unwrap();
        assert!(ci.lower_bound <= m.score && m.score <= ci.upper_bound);
    }
    let positive = run_aggregation(&questionnaire_scores(9, 0.1), fast_settings()).unwrap();
    assert!(positive.macro_score.score > 0.0);
}

#[test]
fn macro_walks_back_to_atomic_ids() {
    let input = questionnaire_scores(5, 0.0);
    let report = run_aggregation(&input, fast_settings()).unwrap();
    let m = &report.macro_score;
    let first = &m.cluster_scores[0].area_scores[0].dimension_scores[0].contributing_question_ids[0];
    assert!(input.iter().any(|a| &a.question_id == first));

    let (cluster, area, dim) = m.trace_question(first).unwrap();
    let original = input.iter().find(|a| &a.question_id == first).unwrap();
    assert_eq!(area, original.policy_area_id);
    assert_eq!(dim, original.dimension_id);
    assert!(cluster.starts_with("CL"));
    assert_eq!(m.question_ids().len(), input.len());
}

#[test]
fn empty_input_fails_in_every_phase() {
    let s = AggregationSettings::canonical();
    let mut ctx = RunContext::new(1);
    let checks: Vec<(AggregationLevel, AggregationError)> = vec![
        (AggregationLevel::Dimension, aggregate_dimensions(&[], &s, &mut ctx).unwrap_err()),
        (AggregationLevel::Area, aggregate_areas(&[], &s, &mut ctx).unwrap_err()),
        (AggregationLevel::Cluster, aggregate_clusters(&[], &s, &mut ctx).unwrap_err()),
        (AggregationLevel::Macro, evaluate_macro(&[], &[], &[], &s, &mut ctx).unwrap_err()),
    ];
    for (phase, err) in checks {
        assert!(matches!(err, AggregationError::AggregationValidation { .. }), "{err}");
        assert_eq!(err.phase(), phase);
        assert!(err.to_string().contains(phase.as_str()));
        assert!(!err.remediation().is_empty());
    }
}

#[test]
fn phases_compose_by_hand() {
    let mut s = AggregationSettings::canonical();
    s.confidence.method = IntervalSetting::Disabled;
    let input = questionnaire_scores(21, 0.0);
    let mut ctx = RunContext::new(s.seed);
    let dims = aggregate_dimensions(&input, &s, &mut ctx).unwrap();
    let areas = aggregate_areas(&dims, &s, &mut ctx).unwrap();
    let clusters = aggregate_clusters(&areas, &s, &mut ctx).unwrap();
    let m = evaluate_macro(&clusters, &areas, &dims, &s, &mut ctx).unwrap();

    let piped = AggregationPipeline::new(s).unwrap().run(&input).unwrap();
    assert_eq!(m, piped.macro_score);
    assert!(ctx.warnings().is_empty());
}
