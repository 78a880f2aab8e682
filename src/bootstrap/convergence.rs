//! Convergence diagnostics for a bootstrap draw sequence.
//!
//! The sequence is examined in draw order:
//! - two-sample Kolmogorov–Smirnov statistic between the head (first 20%) and
//!   the tail (last 30%), as a non-stationarity probe;
//! - Geweke z-score comparing the mean of the first 10% and the last 50%;
//! - autocorrelation up to `max_lag`, integrated autocorrelation time and
//!   effective sample size;
//! - the separation index from the dispersion shape check, as a bimodality probe.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::normal_cdf;
use crate::dispersion::separation_index;

pub const FLAG_LOW_SAMPLE_COUNT: &str = "WARNING: low sample count";
pub const FLAG_ZERO_VARIANCE: &str = "CRITICAL: zero variance";
pub const FLAG_BIMODALITY: &str = "CRITICAL: bimodality detected";

/// Cap on |z| when the Geweke standard error vanishes but the means differ.
const MAX_GEWEKE_Z: f64 = 1e3;
const TINY: f64 = 1e-18;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// KS statistic at or above this fails the drift check.
    pub ks_threshold: f64,
    pub geweke_z_threshold: f64,
    /// Geweke p-value must exceed this for the check to pass.
    pub geweke_p_threshold: f64,
    pub min_effective_sample_size: f64,
    pub bimodality_threshold: f64,
    /// Fewer draws than this raises a low-sample warning.
    pub min_samples: usize,
    pub max_lag: usize,
    pub ks_head_fraction: f64,
    pub ks_tail_fraction: f64,
    pub geweke_first_fraction: f64,
    pub geweke_last_fraction: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            ks_threshold: 0.05,
            geweke_z_threshold: 2.0,
            geweke_p_threshold: 0.01,
            min_effective_sample_size: 400.0,
            bimodality_threshold: 2.0,
            min_samples: 1000,
            max_lag: 100,
            ks_head_fraction: 0.2,
            ks_tail_fraction: 0.3,
            geweke_first_fraction: 0.1,
            geweke_last_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Converged,
    Failed,
}

/// How much evidence `is_reliable` demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    /// All five checks pass and no pathology flags.
    Strict,
    /// At least three checks pass and no critical flags.
    Lenient,
}

/// Outcome of each individual check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceChecks {
    pub ks: bool,
    pub geweke_z: bool,
    pub geweke_p: bool,
    pub effective_sample_size: bool,
    pub bimodality: bool,
}

impl ConvergenceChecks {
    pub fn passed(&self) -> usize {
        [
            self.ks,
            self.geweke_z,
            self.geweke_p,
            self.effective_sample_size,
            self.bimodality,
        ]
        .iter()
        .filter(|ok| **ok)
        .count()
    }

    pub fn all(&self) -> bool {
        self.passed() == 5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceDiagnostics {
    pub sample_count: usize,
    pub ks_statistic: f64,
    pub geweke_z: f64,
    pub geweke_p_value: f64,
    /// ACF at lags `1..=max_lag`.
    pub autocorrelation: Vec<f64>,
    pub integrated_autocorrelation_time: f64,
    pub effective_sample_size: f64,
    pub bimodality_index: f64,
    pub checks: ConvergenceChecks,
    pub pathology_flags: Vec<String>,
    pub status: ConvergenceStatus,
}

impl ConvergenceDiagnostics {
    pub fn has_critical_flag(&self) -> bool {
        self.pathology_flags.iter().any(|f| f.starts_with("CRITICAL"))
    }

    pub fn is_reliable(&self, mode: Reliability) -> bool {
        match mode {
            Reliability::Strict => self.checks.all() && self.pathology_flags.is_empty(),
            Reliability::Lenient => self.checks.passed() >= 3 && !self.has_critical_flag(),
        }
    }
}

// ---------------------------------------------------------------------
//  Statistics
// ---------------------------------------------------------------------

fn mean_var(xs: &[f64]) -> (f64, f64) {
    let n = xs.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = xs.iter().map(|x| (x - mean) * (x - mean)).sum();
    (mean, ss / (n - 1) as f64)
}

/// Two-sample Kolmogorov–Smirnov statistic `sup |F_a - F_b|`.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
    b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / na - j as f64 / nb).abs());
    }
    d
}

/// Geweke diagnostic: `(z, two-sided p)`, with the standard error of the
/// mean difference taken from the pooled variance of both windows.
pub fn geweke(draws: &[f64], first_fraction: f64, last_fraction: f64) -> (f64, f64) {
    let n = draws.len();
    let n_first = ((n as f64) * first_fraction).ceil() as usize;
    let n_last = ((n as f64) * last_fraction).floor() as usize;
    if n_first < 2 || n_last < 2 || n_first + n_last > n {
        return (0.0, 1.0);
    }
    let (m1, v1) = mean_var(&draws[..n_first]);
    let (m2, v2) = mean_var(&draws[n - n_last..]);
    let (n1, n2) = (n_first as f64, n_last as f64);
    let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / (n1 + n2 - 2.0);
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    let diff = m1 - m2;
    let z = if se <= TINY {
        if diff.abs() <= TINY {
            0.0
        } else {
            MAX_GEWEKE_Z.copysign(diff)
        }
    } else {
        (diff / se).clamp(-MAX_GEWEKE_Z, MAX_GEWEKE_Z)
    };
    let p = (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0);
    (z, p)
}

/// Autocorrelation at lags `1..=max_lag` (biased estimator, normalised by lag 0).
pub fn autocorrelation(draws: &[f64], max_lag: usize) -> Vec<f64> {
    let n = draws.len();
    if n < 2 {
        return Vec::new();
    }
    let mean = draws.iter().sum::<f64>() / n as f64;
    let c0: f64 = draws.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;
    if c0 <= TINY {
        return Vec::new();
    }
    let max_lag = max_lag.min(n - 1);
    (1..=max_lag)
        .map(|k| {
            let ck: f64 = draws[..n - k]
                .iter()
                .zip(&draws[k..])
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / n as f64;
            ck / c0
        })
        .collect()
}

// ---------------------------------------------------------------------
//  Analyzer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ConvergenceAnalyzer {
    pub cfg: ConvergenceConfig,
}

impl ConvergenceAnalyzer {
    pub fn new(cfg: ConvergenceConfig) -> Self {
        Self { cfg }
    }

    /// Analyze draws in the order they were produced.
    pub fn analyze(&self, draws: &[f64]) -> ConvergenceDiagnostics {
        let cfg = &self.cfg;
        let n = draws.len();

        let n_head = ((n as f64) * cfg.ks_head_fraction).floor() as usize;
        let n_tail = ((n as f64) * cfg.ks_tail_fraction).floor() as usize;
        let ks = if n_head + n_tail <= n {
            ks_statistic(&draws[..n_head], &draws[n - n_tail..])
        } else {
            0.0
        };

        let (geweke_z, geweke_p) = geweke(draws, cfg.geweke_first_fraction, cfg.geweke_last_fraction);

        let acf = autocorrelation(draws, cfg.max_lag);
        // Clamped at 1 so the effective sample size never exceeds n.
        let act = (1.0 + 2.0 * acf.iter().sum::<f64>()).max(1.0);
        let ess = n as f64 / act;

        let bimodality = separation_index(draws);
        let (_, var) = mean_var(draws);

        let mut flags = Vec::new();
        if n < cfg.min_samples {
            flags.push(FLAG_LOW_SAMPLE_COUNT.to_string());
        }
        if var <= TINY {
            flags.push(FLAG_ZERO_VARIANCE.to_string());
        }
        if bimodality > cfg.bimodality_threshold {
            flags.push(FLAG_BIMODALITY.to_string());
        }

        let checks = ConvergenceChecks {
            ks: ks < cfg.ks_threshold,
            geweke_z: geweke_z.abs() < cfg.geweke_z_threshold,
            geweke_p: geweke_p > cfg.geweke_p_threshold,
            effective_sample_size: ess > cfg.min_effective_sample_size,
            bimodality: bimodality < cfg.bimodality_threshold,
        };

        let critical = flags.iter().any(|f| f.starts_with("CRITICAL"));
        let status = if ks > cfg.ks_threshold || geweke_z.abs() > cfg.geweke_z_threshold || critical {
            ConvergenceStatus::Failed
        } else {
            ConvergenceStatus::Converged
        };

        ConvergenceDiagnostics {
            sample_count: n,
            ks_statistic: ks,
            geweke_z,
            geweke_p_value: geweke_p,
            autocorrelation: acf,
            integrated_autocorrelation_time: act,
            effective_sample_size: ess,
            bimodality_index: bimodality,
            checks,
            pathology_flags: flags,
            status,
        }
    }
}
