#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use plan_aggregator::bootstrap::{mean_statistic, BcaBootstrap, BootstrapConfig, ConvergenceConfig};
use plan_aggregator::dispersion::DispersionAnalyzer;
use plan_aggregator::model::AtomicScore;
use plan_aggregator::penalty::{AdaptivePenaltyScorer, PenaltyComparison, PenaltyOutcome};
use plan_aggregator::pipeline::AggregationPipeline;
use plan_aggregator::settings::{AggregationSettings, InsufficiencyPolicy, QuestionnaireSpec};

#[derive(Parser)]
#[command(name = "plan-aggregator", version, about = "Hierarchical plan score aggregation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate atomic scores into dimension, area, cluster and macro scores
    Aggregate {
        /// JSON array of atomic scores
        #[arg(long)]
        scores: PathBuf,
        /// Settings JSON (defaults to the canonical 10 × 6 universe)
        #[arg(long, conflicts_with = "questionnaire")]
        settings: Option<PathBuf>,
        /// Questionnaire JSON to derive settings from
        #[arg(long)]
        questionnaire: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        /// Warn and degrade instead of aborting on insufficient groups
        #[arg(long)]
        degrade: bool,
        /// Evaluate groups on one thread
        #[arg(long)]
        sequential: bool,
    },
    /// Write a settings template
    Settings {
        #[arg(long)]
        out: PathBuf,
        /// Derive from a questionnaire instead of the canonical universe
        #[arg(long)]
        questionnaire: Option<PathBuf>,
    },
    /// BCa interval and convergence diagnostics for the mean of a JSON number array
    Bootstrap {
        #[arg(long)]
        values: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 2000)]
        iterations: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
    },
    /// Adaptive vs fixed penalty for a JSON number array
    Penalty {
        #[arg(long)]
        values: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct PenaltyReport {
    outcome: PenaltyOutcome,
    comparison: PenaltyComparison,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate {
            scores,
            settings,
            questionnaire,
            out,
            seed,
            degrade,
            sequential,
        } => {
            let mut settings = load_settings(settings, questionnaire)?;
            if let Some(seed) = seed {
                settings.seed = seed;
            }
            if degrade {
                settings.insufficiency_policy = InsufficiencyPolicy::WarnAndDegrade;
            }
            if sequential {
                settings.parallel = false;
            }
            let atomic: Vec<AtomicScore> = read_json(&scores)?;
            let report = AggregationPipeline::new(settings)?.run(&atomic)?;
            write_json(&out, &report)?;
            println!(
                "macro score {:.3} ({}) from {} atomic scores; validation {}; {} warning(s)",
                report.macro_score.score,
                report.macro_score.quality_level,
                report.input_count,
                if report.passed() { "passed" } else { "FAILED" },
                report.warnings.len()
            );
        }
        Commands::Settings { out, questionnaire } => {
            let settings = load_settings(None, questionnaire)?;
            write_json(&out, &settings)?;
        }
        Commands::Bootstrap {
            values,
            out,
            iterations,
            seed,
            alpha,
        } => {
            let data: Vec<f64> = read_json(&values)?;
            let cfg = BootstrapConfig {
                alpha,
                iterations,
                ..BootstrapConfig::default()
            };
            let report = BcaBootstrap::new(cfg, seed).compute_with_convergence(
                &data,
                &mean_statistic,
                &ConvergenceConfig::default(),
            )?;
            write_json(&out, &report)?;
            println!(
                "mean {:.4} [{:.4}, {:.4}] ({:?})",
                report.uncertainty.point_estimate,
                report.uncertainty.ci_lower,
                report.uncertainty.ci_upper,
                report.convergence.status
            );
        }
        Commands::Penalty { values, out } => {
            let data: Vec<f64> = read_json(&values)?;
            let analyzer = DispersionAnalyzer::default();
            let scorer = AdaptivePenaltyScorer::default();
            let outcome = scorer.score(&analyzer, &data, None)?;
            let comparison = scorer.compare_with_fixed(&outcome.metrics, outcome.weighted_mean);
            println!(
                "adaptive {:.4} vs fixed {:.4} ({:?})",
                comparison.adaptive_score, comparison.fixed_score, comparison.scenario
            );
            write_json(&out, &PenaltyReport { outcome, comparison })?;
        }
    }

    Ok(())
}

fn load_settings(
    settings: Option<PathBuf>,
    questionnaire: Option<PathBuf>,
) -> Result<AggregationSettings, Box<dyn std::error::Error>> {
    if let Some(path) = settings {
        return Ok(AggregationSettings::from_json_path(path)?);
    }
    if let Some(path) = questionnaire {
        let spec: QuestionnaireSpec = read_json(&path)?;
        let settings = AggregationSettings::from_questionnaire(&spec);
        settings.validate()?;
        return Ok(settings);
    }
    Ok(AggregationSettings::canonical())
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
