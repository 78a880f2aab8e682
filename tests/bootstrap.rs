use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use plan_aggregator::bootstrap::{
    mean_statistic, BcaBootstrap, BootstrapConfig, ConvergenceAnalyzer, ConvergenceConfig,
    ConvergenceStatus, Reliability,
};
use plan_aggregator::model::{IntervalMethod, MAX_SCORE};

fn sample(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0.5..=2.5)).collect()
}

fn config(iterations: usize) -> BootstrapConfig {
    BootstrapConfig {
        iterations,
        ..BootstrapConfig::default()
    }
}

#[test]
fn bca_interval_brackets_the_sample_mean() {
    let data = sample(1, 40);
    let m = BcaBootstrap::new(config(2000), 42).compute(&data, &mean_statistic).unwrap();
    assert_eq!(m.method, IntervalMethod::Bca);
    assert_eq!(m.sample_count, 2000);
    assert!((m.point_estimate - mean_statistic(&data)).abs() < 1e-12);
    assert!(m.ci_lower < m.point_estimate && m.point_estimate < m.ci_upper);
    assert!(m.std_error > 0.0);
    assert!((m.confidence_level - 0.95).abs() < 1e-12);

    let ci = m.to_interval(MAX_SCORE);
    assert!(ci.lower_bound >= 0.0 && ci.upper_bound <= MAX_SCORE);
    assert!(ci.lower_bound <= ci.point_estimate && ci.point_estimate <= ci.upper_bound);
}

#[test]
fn same_seed_same_interval() {
    let data = sample(2, 25);
    let a = BcaBootstrap::new(config(1000), 7).compute(&data, &mean_statistic).unwrap();
    let b = BcaBootstrap::new(config(1000), 7).compute(&data, &mean_statistic).unwrap();
    assert_eq!(a, b);
}

#[test]
fn wider_interval_at_lower_alpha() {
    let data = sample(3, 30);
    let narrow = BcaBootstrap::new(
        BootstrapConfig {
            alpha: 0.2,
            ..config(2000)
        },
        5,
    )
    .compute(&data, &mean_statistic)
    .unwrap();
    let wide = BcaBootstrap::new(
        BootstrapConfig {
            alpha: 0.01,
            ..config(2000)
        },
        5,
    )
    .compute(&data, &mean_statistic)
    .unwrap();
    assert!(wide.ci_upper - wide.ci_lower > narrow.ci_upper - narrow.ci_lower);
}

#[test]
fn constant_sample_gives_zero_width() {
    let m = BcaBootstrap::new(config(500), 1)
        .compute(&[1.5, 1.5, 1.5, 1.5], &mean_statistic)
        .unwrap();
    assert_eq!(m.ci_lower, 1.5);
    assert_eq!(m.ci_upper, 1.5);
    assert_eq!(m.std_error, 0.0);
}

#[test]
fn too_few_points_is_an_error() {
    assert!(BcaBootstrap::new(config(500), 1).compute(&[2.0], &mean_statistic).is_err());
    assert!(BcaBootstrap::new(config(0), 1).compute(&[1.0, 2.0], &mean_statistic).is_err());
}

#[test]
fn custom_statistic_over_pairs() {
    let pairs: Vec<(f64, f64)> = sample(4, 20).into_iter().zip((1..=20).map(f64::from)).collect();
    let weighted = |xs: &[(f64, f64)]| {
        let w: f64 = xs.iter().map(|p| p.1).sum();
        xs.iter().map(|p| p.0 * p.1).sum::<f64>() / w
    };
    let m = BcaBootstrap::new(config(1000), 9).compute(&pairs, &weighted).unwrap();
    assert!((m.point_estimate - weighted(&pairs)).abs() < 1e-12);
    assert!(m.ci_lower <= m.point_estimate && m.point_estimate <= m.ci_upper);
}

#[test]
fn independent_draws_converge() {
    let data = sample(6, 50);
    let loose = ConvergenceConfig {
        ks_threshold: 0.1,
        geweke_z_threshold: 4.0,
        geweke_p_threshold: 1e-4,
        ..ConvergenceConfig::default()
    };
    let report = BcaBootstrap::new(config(4000), 11)
        .compute_with_convergence(&data, &mean_statistic, &loose)
        .unwrap();
    let diag = &report.convergence;
    assert_eq!(diag.sample_count, 4000);
    assert!(diag.effective_sample_size > 0.0);
    assert!(diag.integrated_autocorrelation_time >= 1.0);
    assert!(diag.checks.ks);
    assert_eq!(diag.status, ConvergenceStatus::Converged);
    assert!(diag.is_reliable(Reliability::Lenient));
}

#[test]
fn drifting_chain_is_flagged() {
    let drift: Vec<f64> = (0..2000).map(|i| i as f64 / 100.0).collect();
    let diag = ConvergenceAnalyzer::new(ConvergenceConfig::default()).analyze(&drift);
    assert_eq!(diag.status, ConvergenceStatus::Failed);
    assert!(!diag.checks.ks);
    assert!(diag.geweke_z.abs() > 2.0);
    assert!(!diag.is_reliable(Reliability::Strict));
}
