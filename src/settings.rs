//! Aggregation settings.
//!
//! Everything tunable lives here and is `serde`-loadable with defaults, so a
//! partial JSON file only needs to name what it overrides. The identifier
//! universe (policy areas, dimensions, cluster membership) normally comes from
//! the questionnaire document via [`AggregationSettings::from_questionnaire`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bootstrap::{BootstrapConfig, ConvergenceConfig, Reliability};
use crate::dispersion::DispersionConfig;
use crate::grouping::GroupField;
use crate::model::{AggregationLevel, QualityLevel, MAX_SCORE};
use crate::penalty::PenaltyConfig;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

// =============================================================================
// Identifier universe
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedId {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl NamedId {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A cluster of policy areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub policy_area_ids: Vec<String>,
    /// Optional per-member weights; members not listed weigh 1.0.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub area_weights: BTreeMap<String, f64>,
}

impl ClusterDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, members: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            policy_area_ids: members.iter().map(|m| m.to_string()).collect(),
            area_weights: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Tunables
// =============================================================================

/// Grouping keys per phase. Cluster and macro phases group by membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupBySettings {
    pub dimension: Vec<GroupField>,
    pub area: Vec<GroupField>,
}

impl Default for GroupBySettings {
    fn default() -> Self {
        Self {
            dimension: vec![GroupField::PolicyAreaId, GroupField::DimensionId],
            area: vec![GroupField::PolicyAreaId],
        }
    }
}

/// Quality band cut points on the normalised `score / max_score` scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub excellent: f64,
    pub good: f64,
    pub acceptable: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: 0.85,
            good: 0.70,
            acceptable: 0.55,
        }
    }
}

impl QualityThresholds {
    pub fn classify(&self, score: f64, max_score: f64) -> QualityLevel {
        let normalized = if max_score > 0.0 { score / max_score } else { 0.0 };
        if normalized >= self.excellent {
            QualityLevel::Excellent
        } else if normalized >= self.good {
            QualityLevel::Good
        } else if normalized >= self.acceptable {
            QualityLevel::Acceptable
        } else {
            QualityLevel::Insufficient
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalSetting {
    /// BCa bootstrap over the group's `(score, weight)` pairs.
    Bca,
    /// Normal approximation `point ± z·σ·penalty/√n`.
    Analytical,
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceSettings {
    pub method: IntervalSetting,
    pub bootstrap: BootstrapConfig,
    /// Run convergence diagnostics on a second bootstrap draw.
    pub diagnostics: bool,
    pub convergence: ConvergenceConfig,
    /// When set, unreliable diagnostics escalate per the insufficiency policy.
    /// Implies `diagnostics`.
    pub require_reliability: Option<Reliability>,
}

impl ConfidenceSettings {
    /// Whether bootstrap intervals get a second, diagnosed draw.
    pub fn runs_diagnostics(&self) -> bool {
        self.diagnostics || self.require_reliability.is_some()
    }
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            method: IntervalSetting::Bca,
            bootstrap: BootstrapConfig::default(),
            diagnostics: false,
            convergence: ConvergenceConfig::default(),
            require_reliability: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinGroupSize {
    pub dimension: usize,
    pub area: usize,
    pub cluster: usize,
    #[serde(rename = "macro")]
    pub holistic: usize,
}

impl Default for MinGroupSize {
    fn default() -> Self {
        Self {
            dimension: 1,
            area: 1,
            cluster: 1,
            holistic: 1,
        }
    }
}

impl MinGroupSize {
    pub fn for_level(&self, level: AggregationLevel) -> usize {
        match level {
            AggregationLevel::Dimension => self.dimension,
            AggregationLevel::Area => self.area,
            AggregationLevel::Cluster => self.cluster,
            AggregationLevel::Macro => self.holistic,
        }
    }
}

/// What to do when a group is missing or too small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficiencyPolicy {
    /// Fail the phase with an error naming the group.
    #[default]
    StrictAbort,
    /// Log a warning, skip or degrade the group, continue.
    WarnAndDegrade,
}

// =============================================================================
// AggregationSettings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    pub policy_areas: Vec<NamedId>,
    pub dimensions: Vec<NamedId>,
    pub clusters: Vec<ClusterDef>,
    /// Macro-level weights by cluster id; unlisted clusters weigh 1.0.
    pub cluster_weights: BTreeMap<String, f64>,
    /// Area-level weights by dimension id; unlisted dimensions weigh 1.0.
    pub dimension_weights: BTreeMap<String, f64>,
    pub group_by: GroupBySettings,
    pub quality_thresholds: QualityThresholds,
    pub dispersion: DispersionConfig,
    pub penalty: PenaltyConfig,
    pub confidence: ConfidenceSettings,
    pub min_group_size: MinGroupSize,
    pub insufficiency_policy: InsufficiencyPolicy,
    /// Areas below this band are reported as systemic gaps.
    pub acceptable_level: QualityLevel,
    /// Evaluate groups within a phase on the rayon pool.
    pub parallel: bool,
    pub seed: u64,
    pub max_score: f64,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            policy_areas: Vec::new(),
            dimensions: Vec::new(),
            clusters: Vec::new(),
            cluster_weights: BTreeMap::new(),
            dimension_weights: BTreeMap::new(),
            group_by: GroupBySettings::default(),
            quality_thresholds: QualityThresholds::default(),
            dispersion: DispersionConfig::default(),
            penalty: PenaltyConfig::default(),
            confidence: ConfidenceSettings::default(),
            min_group_size: MinGroupSize::default(),
            insufficiency_policy: InsufficiencyPolicy::default(),
            acceptable_level: QualityLevel::Acceptable,
            parallel: true,
            seed: 42,
            max_score: MAX_SCORE,
        }
    }
}

/// Questionnaire document fields the engine derives its settings from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireSpec {
    pub policy_areas: Vec<NamedId>,
    pub dimensions: Vec<NamedId>,
    pub clusters: Vec<ClusterDef>,
    #[serde(default)]
    pub quality_thresholds: Option<QualityThresholds>,
    #[serde(default)]
    pub dimension_weights: BTreeMap<String, f64>,
}

const CANONICAL_AREAS: [(&str, &str); 10] = [
    ("PA01", "Gender equality"),
    ("PA02", "Prevention of violence and protection"),
    ("PA03", "Environment and climate"),
    ("PA04", "Economic, social and cultural rights"),
    ("PA05", "Victims and peacebuilding"),
    ("PA06", "Children, youth and protective environments"),
    ("PA07", "Land and territory"),
    ("PA08", "Human rights defenders"),
    ("PA09", "Persons deprived of liberty"),
    ("PA10", "Migration"),
];

const CANONICAL_DIMENSIONS: [(&str, &str); 6] = [
    ("DIM01", "Inputs"),
    ("DIM02", "Activities"),
    ("DIM03", "Products"),
    ("DIM04", "Results"),
    ("DIM05", "Impacts"),
    ("DIM06", "Causality"),
];

impl AggregationSettings {
    /// 10 policy areas × 6 dimensions in 4 clusters.
    pub fn canonical() -> Self {
        Self {
            policy_areas: CANONICAL_AREAS
                .iter()
                .map(|(id, name)| NamedId::new(*id, *name))
                .collect(),
            dimensions: CANONICAL_DIMENSIONS
                .iter()
                .map(|(id, name)| NamedId::new(*id, *name))
                .collect(),
            clusters: vec![
                ClusterDef::new("CL01", "Security and peace", &["PA02", "PA03", "PA07"]),
                ClusterDef::new("CL02", "Social groups", &["PA01", "PA05", "PA06"]),
                ClusterDef::new("CL03", "Territory and environment", &["PA04", "PA08"]),
                ClusterDef::new("CL04", "Social rights and crisis", &["PA09", "PA10"]),
            ],
            ..Self::default()
        }
    }

    pub fn from_questionnaire(spec: &QuestionnaireSpec) -> Self {
        Self {
            policy_areas: spec.policy_areas.clone(),
            dimensions: spec.dimensions.clone(),
            clusters: spec.clusters.clone(),
            quality_thresholds: spec.quality_thresholds.clone().unwrap_or_default(),
            dimension_weights: spec.dimension_weights.clone(),
            ..Self::default()
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn area_ids(&self) -> Vec<String> {
        self.policy_areas.iter().map(|a| a.id.clone()).collect()
    }

    pub fn dimension_ids(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.id.clone()).collect()
    }

    pub fn cluster_ids(&self) -> Vec<String> {
        self.clusters.iter().map(|c| c.id.clone()).collect()
    }

    pub fn area_name(&self, area_id: &str) -> Option<&str> {
        self.policy_areas
            .iter()
            .find(|a| a.id == area_id)
            .map(NamedId::display_name)
    }

    pub fn classify(&self, score: f64) -> QualityLevel {
        self.quality_thresholds.classify(score, self.max_score)
    }

    pub fn cluster_weight(&self, cluster_id: &str) -> f64 {
        self.cluster_weights.get(cluster_id).copied().unwrap_or(1.0)
    }

    pub fn dimension_weight(&self, dimension_id: &str) -> f64 {
        self.dimension_weights.get(dimension_id).copied().unwrap_or(1.0)
    }

    /// Check internal consistency; collects every problem before failing.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut problems = Vec::new();

        if self.policy_areas.is_empty() {
            problems.push("policy_areas is empty".to_string());
        }
        if self.dimensions.is_empty() {
            problems.push("dimensions is empty".to_string());
        }
        if self.clusters.is_empty() {
            problems.push("clusters is empty".to_string());
        }
        for (label, ids) in [
            ("policy area", self.area_ids()),
            ("dimension", self.dimension_ids()),
            ("cluster", self.cluster_ids()),
        ] {
            let mut seen = BTreeSet::new();
            for id in &ids {
                if id.trim().is_empty() {
                    problems.push(format!("empty {label} id"));
                } else if !seen.insert(id.as_str()) {
                    problems.push(format!("duplicate {label} id {id}"));
                }
            }
        }

        let areas: BTreeSet<&str> = self.policy_areas.iter().map(|a| a.id.as_str()).collect();
        for cluster in &self.clusters {
            if cluster.policy_area_ids.is_empty() {
                problems.push(format!("cluster {} has no member areas", cluster.id));
            }
            for member in &cluster.policy_area_ids {
                if !areas.contains(member.as_str()) {
                    problems.push(format!(
                        "cluster {} references unknown policy area {member}",
                        cluster.id
                    ));
                }
            }
            for (member, w) in &cluster.area_weights {
                if !w.is_finite() || *w < 0.0 {
                    problems.push(format!("cluster {} weight for {member} must be non-negative", cluster.id));
                }
            }
        }
        for (label, weights) in [
            ("cluster_weights", &self.cluster_weights),
            ("dimension_weights", &self.dimension_weights),
        ] {
            for (id, w) in weights {
                if !w.is_finite() || *w < 0.0 {
                    problems.push(format!("{label}[{id}] must be non-negative, got {w}"));
                }
            }
        }

        let mut dim_keys = self.group_by.dimension.clone();
        dim_keys.sort();
        if dim_keys != [GroupField::PolicyAreaId, GroupField::DimensionId] {
            problems.push(format!(
                "group_by.dimension must be policy_area_id + dimension_id, got {:?}",
                self.group_by.dimension
            ));
        }
        if self.group_by.area != [GroupField::PolicyAreaId] {
            problems.push(format!(
                "group_by.area must be [policy_area_id], got {:?}",
                self.group_by.area
            ));
        }

        let q = &self.quality_thresholds;
        if !(0.0 <= q.acceptable && q.acceptable <= q.good && q.good <= q.excellent && q.excellent <= 1.0) {
            problems.push(format!(
                "quality thresholds must satisfy 0 <= acceptable <= good <= excellent <= 1, got {}/{}/{}",
                q.acceptable, q.good, q.excellent
            ));
        }
        let d = &self.dispersion;
        if !(0.0 < d.convergence_cv && d.convergence_cv <= d.moderate_cv && d.moderate_cv <= d.high_cv) {
            problems.push(format!(
                "dispersion CV cut points must be increasing, got {}/{}/{}",
                d.convergence_cv, d.moderate_cv, d.high_cv
            ));
        }
        if !(0.0..=1.0).contains(&self.penalty.base_penalty_weight) {
            problems.push(format!(
                "penalty.base_penalty_weight must lie in [0, 1], got {}",
                self.penalty.base_penalty_weight
            ));
        }
        if let Err(e) = self.confidence.bootstrap.validate() {
            problems.push(e.to_string());
        }
        if self.confidence.require_reliability.is_some() && self.confidence.method != IntervalSetting::Bca {
            problems.push(format!(
                "confidence.require_reliability needs the bca method; {:?} intervals have no bootstrap draws to diagnose",
                self.confidence.method
            ));
        }
        if !(self.max_score > 0.0 && self.max_score.is_finite()) {
            problems.push(format!("max_score must be positive, got {}", self.max_score));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(problems))
        }
    }
}
