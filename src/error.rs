//! Error types for the aggregation engine.
//!
//! Two layers:
//! - [`StatsError`] is raised by the pure statistical primitives (dispersion,
//!   penalty, bootstrap) and knows nothing about phases or groups.
//! - [`AggregationError`] is what aggregators, the validator and the pipeline
//!   return. Every variant names the phase, the offending group key(s) and a
//!   remediation hint so the failure is actionable without a debugger.

use thiserror::Error;

use crate::model::AggregationLevel;

/// Failures of the statistical primitives.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatsError {
    /// Malformed or insufficient input (bad weights, empty slice, NaN scores).
    #[error("validation error: {0}")]
    Validation(String),
    /// A distributional precondition does not hold (e.g. fewer than 2 points).
    #[error("distribution error: {0}")]
    Distribution(String),
}

impl StatsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn distribution(message: impl Into<String>) -> Self {
        Self::Distribution(message.into())
    }

    /// Attach phase and group context.
    pub fn in_group(self, phase: AggregationLevel, group: impl Into<String>) -> AggregationError {
        let group = group.into();
        match self {
            Self::Validation(message) => AggregationError::Validation {
                phase,
                remediation: format!(
                    "check the {phase} inputs for group {group}: scores must be finite and in range, weights non-negative"
                ),
                group,
                message,
            },
            Self::Distribution(message) => AggregationError::Distribution {
                phase,
                remediation: format!(
                    "group {group}: {message}; check confidence.bootstrap (alpha, iterations), use the analytical method, or supply more data"
                ),
                group,
                message,
            },
        }
    }
}

/// Phase-scoped aggregation failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregationError {
    /// Malformed or insufficient input for a group.
    #[error("[{phase}] validation failed for {group}: {message} (hint: {remediation})")]
    Validation {
        phase: AggregationLevel,
        group: String,
        message: String,
        remediation: String,
    },

    /// Statistical precondition violated while scoring a group.
    #[error("[{phase}] distribution error for {group}: {message} (hint: {remediation})")]
    Distribution {
        phase: AggregationLevel,
        group: String,
        message: String,
        remediation: String,
    },

    /// Bootstrap diagnostics say the interval is unreliable and the caller required reliability.
    #[error("[{phase}] bootstrap for {group} did not converge: {} (hint: {remediation})", flags.join("; "))]
    Convergence {
        phase: AggregationLevel,
        group: String,
        flags: Vec<String>,
        remediation: String,
    },

    /// A phase-boundary invariant was breached.
    #[error("[{phase}] aggregation validation failed for [{}]: {diagnosis} (hint: {remediation})", group_keys.join(", "))]
    AggregationValidation {
        phase: AggregationLevel,
        group_keys: Vec<String>,
        diagnosis: String,
        remediation: String,
    },
}

impl AggregationError {
    pub fn validation(
        phase: AggregationLevel,
        group: impl Into<String>,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::Validation {
            phase,
            group: group.into(),
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    pub fn phase_validation(
        phase: AggregationLevel,
        group_keys: Vec<String>,
        diagnosis: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::AggregationValidation {
            phase,
            group_keys,
            diagnosis: diagnosis.into(),
            remediation: remediation.into(),
        }
    }

    /// Empty input for a whole phase.
    pub fn empty_phase(phase: AggregationLevel) -> Self {
        Self::phase_validation(
            phase,
            vec!["*".to_string()],
            format!("{phase} phase received no input records"),
            format!("ensure the phase feeding {phase} aggregation produced output"),
        )
    }

    pub fn phase(&self) -> AggregationLevel {
        match self {
            Self::Validation { phase, .. }
            | Self::Distribution { phase, .. }
            | Self::Convergence { phase, .. }
            | Self::AggregationValidation { phase, .. } => *phase,
        }
    }

    pub fn remediation(&self) -> &str {
        match self {
            Self::Validation { remediation, .. }
            | Self::Distribution { remediation, .. }
            | Self::Convergence { remediation, .. }
            | Self::AggregationValidation { remediation, .. } => remediation,
        }
    }

    /// Group keys involved in the failure.
    pub fn group_keys(&self) -> Vec<String> {
        match self {
            Self::Validation { group, .. }
            | Self::Distribution { group, .. }
            | Self::Convergence { group, .. } => vec![group.clone()],
            Self::AggregationValidation { group_keys, .. } => group_keys.clone(),
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Distribution { .. } => "distribution_error",
            Self::Convergence { .. } => "convergence_error",
            Self::AggregationValidation { .. } => "aggregation_validation_error",
        }
    }
}
