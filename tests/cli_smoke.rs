use std::path::Path;
use std::process::Command;

use plan_aggregator::model::AtomicScore;
use plan_aggregator::{AggregationReport, AggregationSettings};
use tempfile::tempdir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_plan-aggregator"))
}

fn write(path: &Path, value: &impl serde::Serialize) {
    std::fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
}

fn grid(areas: &[&str], dims: &[&str]) -> Vec<AtomicScore> {
    let mut out = Vec::new();
    for (i, pa) in areas.iter().enumerate() {
        for (j, dim) in dims.iter().enumerate() {
            for q in 0..4 {
                let score = ((i + j + q) % 4) as f64 * 0.75;
                out.push(AtomicScore::new(format!("{pa}-{dim}-Q{q}"), *pa, *dim, score));
            }
        }
    }
    out
}

#[test]
fn settings_template_round_trips() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("settings.json");
    let status = bin().arg("settings").arg("--out").arg(&out).status().unwrap();
    assert!(status.success());

    let settings = AggregationSettings::from_json_path(&out).unwrap();
    assert_eq!(settings, AggregationSettings::canonical());
}

#[test]
fn aggregate_writes_report() {
    let dir = tempdir().unwrap();
    let canonical = AggregationSettings::canonical();
    let areas: Vec<&str> = canonical.policy_areas.iter().map(|a| a.id.as_str()).collect();
    let dims: Vec<&str> = canonical.dimensions.iter().map(|d| d.id.as_str()).collect();
    let scores = dir.path().join("scores.json");
    write(&scores, &grid(&areas, &dims));
    let out = dir.path().join("report.json");

    let output = bin()
        .args(["aggregate", "--seed", "7", "--sequential"])
        .arg("--scores")
        .arg(&scores)
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("validation passed"));

    let report: AggregationReport = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report.run_seed, 7);
    assert_eq!(report.input_count, 240);
    assert_eq!(report.cluster_scores.len(), 4);
    assert!(report.passed());
}

#[test]
fn aggregate_from_questionnaire() {
    let dir = tempdir().unwrap();
    let questionnaire = dir.path().join("questionnaire.json");
    let doc = serde_json::json!({
        "policy_areas": [{ "id": "PA01", "name": "Housing" }, { "id": "PA02", "name": "Water" }],
        "dimensions": [{ "id": "DIM01" }, { "id": "DIM02" }],
        "clusters": [{ "id": "CL01", "name": "Services", "policy_area_ids": ["PA01", "PA02"] }]
    });
    std::fs::write(&questionnaire, doc.to_string()).unwrap();
    let scores = dir.path().join("scores.json");
    write(&scores, &grid(&["PA01", "PA02"], &["DIM01", "DIM02"]));
    let out = dir.path().join("report.json");

    let status = bin()
        .arg("aggregate")
        .arg("--questionnaire")
        .arg(&questionnaire)
        .arg("--scores")
        .arg(&scores)
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let report: AggregationReport = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report.macro_score.strategic_alignment.cell_count(), 4);
    assert_eq!(report.area_scores[0].area_name, "Housing");
}

#[test]
fn aggregate_fails_on_empty_input() {
    let dir = tempdir().unwrap();
    let scores = dir.path().join("scores.json");
    std::fs::write(&scores, "[]").unwrap();
    let out = dir.path().join("report.json");

    let output = bin()
        .arg("aggregate")
        .arg("--scores")
        .arg(&scores)
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("dimension"));
    assert!(!out.exists());
}

#[test]
fn bootstrap_and_penalty_commands() {
    let dir = tempdir().unwrap();
    let values = dir.path().join("values.json");
    write(&values, &vec![0.0, 1.0, 2.0, 3.0, 1.5, 2.5, 0.5, 2.0]);

    let boot_out = dir.path().join("bootstrap.json");
    let status = bin()
        .args(["bootstrap", "--iterations", "1500", "--seed", "3"])
        .arg("--values")
        .arg(&values)
        .arg("--out")
        .arg(&boot_out)
        .status()
        .unwrap();
    assert!(status.success());
    let boot: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&boot_out).unwrap()).unwrap();
    let lo = boot["uncertainty"]["ci_lower"].as_f64().unwrap();
    let hi = boot["uncertainty"]["ci_upper"].as_f64().unwrap();
    assert!(lo < 1.5625 && 1.5625 < hi);
    assert_eq!(boot["convergence"]["sample_count"], 1500);

    let pen_out = dir.path().join("penalty.json");
    let status = bin()
        .arg("penalty")
        .arg("--values")
        .arg(&values)
        .arg("--out")
        .arg(&pen_out)
        .status()
        .unwrap();
    assert!(status.success());
    let pen: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&pen_out).unwrap()).unwrap();
    let factor = pen["outcome"]["penalty_factor"].as_f64().unwrap();
    assert!((0.5..=1.0).contains(&factor));
    assert!(pen["comparison"]["fixed_score"].is_number());
}
