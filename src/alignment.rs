//! Strategic alignment across the policy-area × dimension grid.
//!
//! The grid is held as two dense `nalgebra::DMatrix` values (score sums and
//! fill counts), rows being policy areas and columns dimensions in the
//! configured universe order. Cells outside the universe are ignored here;
//! the macro phase reports them as cross-check warnings.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::model::{AreaScore, DimensionScore, QualityLevel};

/// How many dimensions are reported at each end of the ranking.
pub const RANKED_DIMENSIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRank {
    pub dimension_id: String,
    /// Mean score over the areas where this dimension was filled.
    pub mean_score: f64,
    pub filled_areas: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicAlignmentMetrics {
    /// `area id -> dimension id -> score` for every filled cell.
    pub pa_dim_coverage: BTreeMap<String, BTreeMap<String, f64>>,
    /// Filled cells over `|areas| × |dimensions|`.
    pub coverage_rate: f64,
    /// Lowest mean scores first.
    pub weakest_dimensions: Vec<DimensionRank>,
    /// Highest mean scores first.
    pub strongest_dimensions: Vec<DimensionRank>,
    /// Names of areas whose quality band is below the acceptable level.
    pub systemic_gaps: Vec<String>,
    /// `1 - std(area scores) / (max_score / 2)`, clamped to `[0, 1]`.
    pub balance_score: f64,
}

impl StrategicAlignmentMetrics {
    pub fn cell_count(&self) -> usize {
        self.pa_dim_coverage.values().map(BTreeMap::len).sum()
    }

    pub fn cell(&self, area_id: &str, dimension_id: &str) -> Option<f64> {
        self.pa_dim_coverage
            .get(area_id)
            .and_then(|row| row.get(dimension_id))
            .copied()
    }
}

#[derive(Debug, Clone)]
pub struct StrategicAlignmentAnalyzer {
    pub area_ids: Vec<String>,
    pub dimension_ids: Vec<String>,
    /// Areas strictly below this band are systemic gaps.
    pub acceptable_level: QualityLevel,
    pub max_score: f64,
}

impl StrategicAlignmentAnalyzer {
    pub fn new(
        area_ids: Vec<String>,
        dimension_ids: Vec<String>,
        acceptable_level: QualityLevel,
        max_score: f64,
    ) -> Self {
        Self {
            area_ids,
            dimension_ids,
            acceptable_level,
            max_score,
        }
    }

    pub fn analyze(
        &self,
        area_scores: &[AreaScore],
        dimension_scores: &[DimensionScore],
    ) -> StrategicAlignmentMetrics {
        let rows = self.area_ids.len();
        let cols = self.dimension_ids.len();
        let row_of: BTreeMap<&str, usize> = self
            .area_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let col_of: BTreeMap<&str, usize> = self
            .dimension_ids
            .iter()
            .enumerate()
            .map(|(j, id)| (id.as_str(), j))
            .collect();

        // Duplicate records for one cell are averaged.
        let mut sums = DMatrix::<f64>::zeros(rows, cols);
        let mut counts = DMatrix::<f64>::zeros(rows, cols);
        for d in dimension_scores {
            let (Some(&i), Some(&j)) = (
                row_of.get(d.policy_area_id.as_str()),
                col_of.get(d.dimension_id.as_str()),
            ) else {
                continue;
            };
            sums[(i, j)] += d.score;
            counts[(i, j)] += 1.0;
        }

        let mut pa_dim_coverage: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut filled = 0usize;
        for i in 0..rows {
            for j in 0..cols {
                if counts[(i, j)] > 0.0 {
                    filled += 1;
                    pa_dim_coverage
                        .entry(self.area_ids[i].clone())
                        .or_default()
                        .insert(self.dimension_ids[j].clone(), sums[(i, j)] / counts[(i, j)]);
                }
            }
        }
        let coverage_rate = if rows * cols == 0 {
            0.0
        } else {
            filled as f64 / (rows * cols) as f64
        };

        let mut ranks: Vec<DimensionRank> = (0..cols)
            .filter_map(|j| {
                let column: Vec<f64> = (0..rows)
                    .filter(|&i| counts[(i, j)] > 0.0)
                    .map(|i| sums[(i, j)] / counts[(i, j)])
                    .collect();
                if column.is_empty() {
                    return None;
                }
                Some(DimensionRank {
                    dimension_id: self.dimension_ids[j].clone(),
                    mean_score: column.iter().sum::<f64>() / column.len() as f64,
                    filled_areas: column.len(),
                })
            })
            .collect();
        ranks.sort_by(|a, b| {
            a.mean_score
                .partial_cmp(&b.mean_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.dimension_id.cmp(&b.dimension_id))
        });
        let weakest_dimensions: Vec<DimensionRank> =
            ranks.iter().take(RANKED_DIMENSIONS).cloned().collect();
        let strongest_dimensions: Vec<DimensionRank> =
            ranks.iter().rev().take(RANKED_DIMENSIONS).cloned().collect();

        let systemic_gaps = area_scores
            .iter()
            .filter(|a| a.quality_level < self.acceptable_level)
            .map(|a| a.area_name.clone())
            .collect();

        StrategicAlignmentMetrics {
            pa_dim_coverage,
            coverage_rate,
            weakest_dimensions,
            strongest_dimensions,
            systemic_gaps,
            balance_score: self.balance(area_scores),
        }
    }

    fn balance(&self, area_scores: &[AreaScore]) -> f64 {
        if area_scores.is_empty() || self.max_score <= 0.0 {
            return 0.0;
        }
        let n = area_scores.len() as f64;
        let mean = area_scores.iter().map(|a| a.score).sum::<f64>() / n;
        let var = area_scores
            .iter()
            .map(|a| (a.score - mean).powi(2))
            .sum::<f64>()
            / n;
        (1.0 - var.sqrt() / (self.max_score / 2.0)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersion::DispersionAnalyzer;
    use crate::hermeticity::HermeticityDiagnosis;
    use crate::model::MAX_SCORE;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{prefix}{i:02}")).collect()
    }

    fn dim(pa: &str, dim: &str, score: f64) -> DimensionScore {
        DimensionScore {
            policy_area_id: pa.to_string(),
            dimension_id: dim.to_string(),
            score,
            quality_level: QualityLevel::Good,
            contributing_question_ids: vec![format!("{pa}-{dim}-Q1")],
            dispersion_metrics: DispersionAnalyzer::default().analyze(&[score], None).unwrap(),
            penalty_factor: 1.0,
            confidence_interval: None,
        }
    }

    fn area(id: &str, score: f64, quality_level: QualityLevel) -> AreaScore {
        AreaScore {
            area_id: id.to_string(),
            area_name: format!("Area {id}"),
            score,
            quality_level,
            dimension_scores: Vec::new(),
            dispersion_metrics: DispersionAnalyzer::default().analyze(&[score], None).unwrap(),
            penalty_factor: 1.0,
            hermeticity: HermeticityDiagnosis::diagnose(Vec::<&str>::new(), Vec::<&str>::new(), "dimension", id),
            confidence_interval: None,
        }
    }

    fn analyzer() -> StrategicAlignmentAnalyzer {
        StrategicAlignmentAnalyzer::new(ids("PA", 10), ids("DIM", 6), QualityLevel::Acceptable, MAX_SCORE)
    }

    #[test]
    fn full_grid_has_sixty_cells() {
        let mut dims = Vec::new();
        for pa in ids("PA", 10) {
            for (j, d) in ids("DIM", 6).iter().enumerate() {
                dims.push(dim(&pa, d, 1.0 + 0.2 * j as f64));
            }
        }
        let m = analyzer().analyze(&[], &dims);
        assert_eq!(m.cell_count(), 60);
        assert_eq!(m.coverage_rate, 1.0);
        assert_eq!(m.weakest_dimensions[0].dimension_id, "DIM01");
        assert_eq!(m.strongest_dimensions[0].dimension_id, "DIM06");
        assert_eq!(m.weakest_dimensions.len(), 3);
        assert_eq!(m.strongest_dimensions[0].filled_areas, 10);
    }

    #[test]
    fn partial_grid_and_foreign_cells() {
        let dims = vec![
            dim("PA01", "DIM01", 2.0),
            dim("PA01", "DIM02", 1.0),
            dim("PA99", "DIM01", 3.0),
            dim("PA02", "DIM07", 3.0),
        ];
        let m = analyzer().analyze(&[], &dims);
        assert_eq!(m.cell_count(), 2);
        assert!((m.coverage_rate - 2.0 / 60.0).abs() < 1e-12);
        assert_eq!(m.cell("PA01", "DIM02"), Some(1.0));
        assert_eq!(m.cell("PA99", "DIM01"), None);
    }

    #[test]
    fn gaps_and_balance() {
        let areas = vec![
            area("PA01", 2.5, QualityLevel::Excellent),
            area("PA02", 0.5, QualityLevel::Insufficient),
        ];
        let m = analyzer().analyze(&areas, &[]);
        assert_eq!(m.systemic_gaps, vec!["Area PA02".to_string()]);
        // std = 1.0, half-scale = 1.5
        assert!((m.balance_score - (1.0 - 1.0 / 1.5)).abs() < 1e-12);

        let even = vec![area("PA01", 2.0, QualityLevel::Good), area("PA02", 2.0, QualityLevel::Good)];
        let m = analyzer().analyze(&even, &[]);
        assert_eq!(m.balance_score, 1.0);
        assert!(m.systemic_gaps.is_empty());
    }
}
