#![forbid(unsafe_code)]

//! # plan-aggregator
//!
//! Hierarchical aggregation of per-question plan scores into one defensible,
//! traceable verdict.
//!
//! Atomic question scores (0–3) are combined question → dimension →
//! policy area → cluster → macro. At every level siblings are averaged and
//! then discounted by an adaptive penalty that grows with their disagreement,
//! optionally with a BCa bootstrap confidence interval. Structural
//! completeness (hermeticity) and traceability back to question ids are
//! checked at every phase boundary.
//!
//! Expected call sequence, or [`pipeline::AggregationPipeline`] to run all four:
//!
//! ```text
//! aggregate_dimensions → aggregate_areas → aggregate_clusters → evaluate_macro
//! ```

pub mod aggregate;
pub mod alignment;
pub mod bootstrap;
pub mod context;
pub mod dispersion;
pub mod error;
pub mod grouping;
pub mod hermeticity;
pub mod model;
pub mod penalty;
pub mod pipeline;
pub mod settings;
pub mod validator;

pub use aggregate::{aggregate_areas, aggregate_clusters, aggregate_dimensions, evaluate_macro};
pub use context::{RunContext, RunWarning};
pub use error::{AggregationError, StatsError};
pub use model::{
    AggregationLevel, AreaScore, AtomicScore, ClusterScore, ConfidenceInterval, DimensionScore,
    MacroScore, QualityLevel, MAX_SCORE,
};
pub use pipeline::{run_aggregation, AggregationPipeline, AggregationReport, PipelineError};
pub use settings::{AggregationSettings, InsufficiencyPolicy};
pub use validator::{PipelineValidator, ValidationMode, ValidationReport};
