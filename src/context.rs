//! Per-run state owned by the orchestrator.
//!
//! A [`RunContext`] replaces any process-wide mutable state: it carries the
//! run seed, derives independent per-group seeds, and collects the warnings
//! raised while degrading. It is passed by `&mut` into each phase and never
//! shared between runs.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::AggregationLevel;

/// A degraded or skipped group, recorded alongside the `tracing` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    pub phase: AggregationLevel,
    pub group: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunContext {
    seed: u64,
    fingerprint: Option<String>,
    warnings: Vec<RunWarning>,
}

impl RunContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            fingerprint: None,
            warnings: Vec::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seed for one group's bootstrap, independent of evaluation order.
    pub fn group_seed(&self, phase: AggregationLevel, group: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(b"|");
        hasher.update(phase.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(group.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Record a blake3 fingerprint of the run's serialized inputs.
    pub fn fingerprint_inputs(&mut self, parts: &[&[u8]]) -> &str {
        let mut hasher = blake3::Hasher::new();
        for (idx, part) in parts.iter().enumerate() {
            if idx > 0 {
                hasher.update(b"|");
            }
            hasher.update(part);
        }
        self.fingerprint.insert(hasher.finalize().to_hex().to_string())
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn warn(&mut self, phase: AggregationLevel, group: impl Into<String>, message: impl Into<String>) {
        let group = group.into();
        let message = message.into();
        warn!(phase = %phase, group = %group, "{message}");
        self.warnings.push(RunWarning {
            phase,
            group,
            message,
        });
    }

    pub fn warnings(&self) -> &[RunWarning] {
        &self.warnings
    }

    pub fn warnings_for(&self, phase: AggregationLevel) -> impl Iterator<Item = &RunWarning> {
        self.warnings.iter().filter(move |w| w.phase == phase)
    }

    pub fn into_warnings(self) -> Vec<RunWarning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_seeds_are_stable_and_distinct() {
        let ctx = RunContext::new(42);
        let a = ctx.group_seed(AggregationLevel::Dimension, "PA01/DIM01");
        assert_eq!(a, RunContext::new(42).group_seed(AggregationLevel::Dimension, "PA01/DIM01"));
        assert_ne!(a, ctx.group_seed(AggregationLevel::Dimension, "PA01/DIM02"));
        assert_ne!(a, ctx.group_seed(AggregationLevel::Area, "PA01/DIM01"));
        assert_ne!(a, RunContext::new(43).group_seed(AggregationLevel::Dimension, "PA01/DIM01"));
    }

    #[test]
    fn warnings_are_kept_per_phase() {
        let mut ctx = RunContext::new(1);
        ctx.warn(AggregationLevel::Cluster, "CL02", "member PA05 missing");
        ctx.warn(AggregationLevel::Area, "PA03", "dimension DIM06 missing");
        assert_eq!(ctx.warnings().len(), 2);
        assert_eq!(ctx.warnings_for(AggregationLevel::Cluster).count(), 1);
        assert_eq!(ctx.into_warnings()[1].group, "PA03");
    }

    #[test]
    fn fingerprint_depends_on_inputs() {
        let mut a = RunContext::new(1);
        let fa = a.fingerprint_inputs(&[b"scores", b"settings"]).to_string();
        let mut b = RunContext::new(1);
        let fb = b.fingerprint_inputs(&[b"scores", b"other"]).to_string();
        assert_ne!(fa, fb);
        assert_eq!(fa.len(), 64);
        assert_eq!(a.fingerprint(), Some(fa.as_str()));
    }
}
