//! BCa bootstrap confidence intervals.
//!
//! 1. `θ̂ = f(data)`
//! 2. `B` resamples with replacement, `f` applied to each
//! 3. bias correction `z₀ = Φ⁻¹(P(θ* < θ̂))`, ties counted as half
//! 4. acceleration `a` from the jackknife:
//!    `a = Σ(m - θ₍ᵢ₎)³ / (6 · (Σ(m - θ₍ᵢ₎)²)^1.5)`
//! 5. adjusted tail levels `Φ(z₀ + (z₀ + z) / (1 - a(z₀ + z)))` index the
//!    sorted bootstrap distribution.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::convergence::{ConvergenceAnalyzer, ConvergenceConfig, ConvergenceDiagnostics};
use super::{normal_cdf, normal_quantile};
use crate::error::StatsError;
use crate::model::{ConfidenceInterval, IntervalMethod};

const TINY: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Two-sided miscoverage; 0.05 gives a 95% interval.
    pub alpha: f64,
    pub iterations: usize,
    /// Hard cap on `iterations`; bounds worst-case latency.
    pub max_iterations: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            iterations: 2000,
            max_iterations: 10_000,
        }
    }
}

impl BootstrapConfig {
    pub fn confidence_level(&self) -> f64 {
        1.0 - self.alpha
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(StatsError::distribution(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.iterations == 0 {
            return Err(StatsError::distribution("bootstrap needs at least one iteration"));
        }
        if self.iterations > self.max_iterations {
            return Err(StatsError::distribution(format!(
                "iterations {} exceed max_iterations {}",
                self.iterations, self.max_iterations
            )));
        }
        Ok(())
    }
}

/// Summary of a bootstrap distribution and its BCa interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyMetrics {
    pub point_estimate: f64,
    pub bootstrap_mean: f64,
    pub median: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub confidence_level: f64,
    pub method: IntervalMethod,
    pub sample_count: usize,
    /// `z₀`.
    pub bias_correction: f64,
    /// Jackknife `a`.
    pub acceleration: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

impl UncertaintyMetrics {
    pub fn to_interval(&self, max_score: f64) -> ConfidenceInterval {
        ConfidenceInterval::bounded(
            self.point_estimate,
            self.ci_lower,
            self.ci_upper,
            self.confidence_level,
            self.method,
            self.sample_count,
            max_score,
        )
    }
}

/// Interval plus convergence diagnostics from an independent second draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub uncertainty: UncertaintyMetrics,
    pub convergence: ConvergenceDiagnostics,
}

// ---------------------------------------------------------------------
//  Utilities
// ---------------------------------------------------------------------

fn sort_f64(v: &mut [f64]) {
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// `(mean, std, skewness, excess kurtosis)` with population moments.
fn moments(xs: &[f64]) -> (f64, f64, f64, f64) {
    let n = xs.len() as f64;
    if xs.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / n;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for x in xs {
        let d = x - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;
    if m2 <= TINY {
        return (mean, 0.0, 0.0, 0.0);
    }
    let sd = m2.sqrt();
    (mean, sd, m3 / (sd * sd * sd), m4 / (m2 * m2) - 3.0)
}

/// Jackknife acceleration for statistic `f` over `data`.
fn jackknife_acceleration<T, F>(data: &[T], statistic: &F) -> f64
where
    T: Clone,
    F: Fn(&[T]) -> f64,
{
    let n = data.len();
    let mut loo: Vec<T> = Vec::with_capacity(n.saturating_sub(1));
    let mut thetas = Vec::with_capacity(n);
    for skip in 0..n {
        loo.clear();
        loo.extend(
            data.iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, x)| x.clone()),
        );
        let t = statistic(&loo);
        if t.is_finite() {
            thetas.push(t);
        }
    }
    if thetas.len() < 2 {
        return 0.0;
    }
    let m = thetas.iter().sum::<f64>() / thetas.len() as f64;
    let (mut num, mut den) = (0.0, 0.0);
    for t in &thetas {
        let d = m - t;
        num += d * d * d;
        den += d * d;
    }
    if den <= TINY {
        return 0.0;
    }
    num / (6.0 * den.powf(1.5))
}

fn bca_index(z0: f64, a: f64, z: f64, len: usize) -> usize {
    let num = z0 + z;
    let denom = 1.0 - a * num;
    let level = if denom <= TINY {
        normal_cdf(z)
    } else {
        normal_cdf(z0 + num / denom)
    };
    let idx = (level * len as f64).floor();
    if idx.is_finite() && idx > 0.0 {
        (idx as usize).min(len - 1)
    } else {
        0
    }
}

// ---------------------------------------------------------------------
//  Engine
// ---------------------------------------------------------------------

/// BCa bootstrap with its own seeded generator.
#[derive(Debug, Clone)]
pub struct BcaBootstrap {
    pub cfg: BootstrapConfig,
    rng: StdRng,
}

impl BcaBootstrap {
    pub fn new(cfg: BootstrapConfig, seed: u64) -> Self {
        Self {
            cfg,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Bootstrap distribution of `statistic`, in draw order. Non-finite
    /// replicates are dropped.
    pub fn draw<T, F>(&mut self, data: &[T], statistic: &F) -> Vec<f64>
    where
        T: Clone,
        F: Fn(&[T]) -> f64,
    {
        let n = data.len();
        if n == 0 {
            return Vec::new();
        }
        let mut sample: Vec<T> = Vec::with_capacity(n);
        let mut out = Vec::with_capacity(self.cfg.iterations);
        for _ in 0..self.cfg.iterations {
            sample.clear();
            for _ in 0..n {
                let idx = self.rng.gen_range(0..n);
                sample.push(data[idx].clone());
            }
            let t = statistic(&sample);
            if t.is_finite() {
                out.push(t);
            }
        }
        out
    }

    /// BCa interval for `statistic` over `data`.
    pub fn compute<T, F>(&mut self, data: &[T], statistic: &F) -> Result<UncertaintyMetrics, StatsError>
    where
        T: Clone,
        F: Fn(&[T]) -> f64,
    {
        self.cfg.validate()?;
        if data.len() < 2 {
            return Err(StatsError::distribution(format!(
                "BCa bootstrap needs at least 2 data points, got {}",
                data.len()
            )));
        }
        let theta = statistic(data);
        if !theta.is_finite() {
            return Err(StatsError::distribution("statistic is not finite on the full sample"));
        }

        let mut boot = self.draw(data, statistic);
        if boot.is_empty() {
            return Err(StatsError::distribution("every bootstrap replicate was non-finite"));
        }
        let b = boot.len();
        let (boot_mean, std_error, skewness, excess_kurtosis) = moments(&boot);
        sort_f64(&mut boot);
        let median = median_sorted(&boot);
        let confidence_level = self.cfg.confidence_level();

        if std_error <= TINY {
            return Ok(UncertaintyMetrics {
                point_estimate: theta,
                bootstrap_mean: boot_mean,
                median,
                std_error: 0.0,
                ci_lower: theta,
                ci_upper: theta,
                confidence_level,
                method: IntervalMethod::Bca,
                sample_count: b,
                bias_correction: 0.0,
                acceleration: 0.0,
                skewness: 0.0,
                excess_kurtosis: 0.0,
            });
        }

        let below = boot.iter().filter(|t| **t < theta).count() as f64;
        let ties = boot.iter().filter(|t| (**t - theta).abs() <= TINY).count() as f64;
        let half = 0.5 / b as f64;
        let prop = ((below + 0.5 * ties) / b as f64).clamp(half, 1.0 - half);
        let z0 = normal_quantile(prop);

        let a = jackknife_acceleration(data, statistic);

        let alpha = self.cfg.alpha;
        let lo_idx = bca_index(z0, a, normal_quantile(alpha / 2.0), b);
        let hi_idx = bca_index(z0, a, normal_quantile(1.0 - alpha / 2.0), b);
        let (lo_idx, hi_idx) = (lo_idx.min(hi_idx), lo_idx.max(hi_idx));

        Ok(UncertaintyMetrics {
            point_estimate: theta,
            bootstrap_mean: boot_mean,
            median,
            std_error,
            ci_lower: boot[lo_idx],
            ci_upper: boot[hi_idx],
            confidence_level,
            method: IntervalMethod::Bca,
            sample_count: b,
            bias_correction: z0,
            acceleration: a,
            skewness,
            excess_kurtosis,
        })
    }

    /// BCa interval plus convergence diagnostics over a second, independent draw.
    pub fn compute_with_convergence<T, F>(
        &mut self,
        data: &[T],
        statistic: &F,
        convergence: &ConvergenceConfig,
    ) -> Result<BootstrapReport, StatsError>
    where
        T: Clone,
        F: Fn(&[T]) -> f64,
    {
        let uncertainty = self.compute(data, statistic)?;
        let second = self.draw(data, statistic);
        let convergence = ConvergenceAnalyzer::new(convergence.clone()).analyze(&second);
        Ok(BootstrapReport {
            uncertainty,
            convergence,
        })
    }
}

/// Mean of a slice; the default statistic for plain samples.
pub fn mean_statistic(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}
