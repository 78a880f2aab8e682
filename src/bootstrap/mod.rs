//! Bootstrap uncertainty quantification.
//!
//! - [`bca`]: bias-corrected and accelerated (BCa) percentile intervals for an
//!   arbitrary statistic, with a jackknife acceleration estimate.
//! - [`convergence`]: diagnostics over a bootstrap draw sequence (KS drift,
//!   Geweke, autocorrelation/ESS, bimodality).
//!
//! Every [`bca::BcaBootstrap`] owns its own seeded `StdRng`; there is no shared
//! generator, so groups can be evaluated in any order or in parallel.

pub mod bca;
pub mod convergence;

use std::f64::consts::SQRT_2;

use statrs::function::erf::{erf, erf_inv};

pub use bca::{mean_statistic, BcaBootstrap, BootstrapConfig, BootstrapReport, UncertaintyMetrics};
pub use convergence::{
    ConvergenceAnalyzer, ConvergenceChecks, ConvergenceConfig, ConvergenceDiagnostics,
    ConvergenceStatus, Reliability,
};

/// Standard normal CDF.
pub(crate) fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

/// Standard normal quantile. `p` is clamped into the open unit interval.
pub(crate) fn normal_quantile(p: f64) -> f64 {
    let p = p.clamp(1e-12, 1.0 - 1e-12);
    SQRT_2 * erf_inv(2.0 * p - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_inverts_cdf() {
        for &z in &[-2.5, -1.96, -0.3, 0.0, 0.7, 1.645, 3.0] {
            let p = normal_cdf(z);
            assert!((normal_quantile(p) - z).abs() < 1e-6, "z={z}");
        }
        assert!((normal_quantile(0.975) - 1.959964).abs() < 1e-5);
    }
}
