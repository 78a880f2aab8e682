//! Structural completeness checks.
//!
//! A group is hermetic when the set of child ids actually aggregated equals
//! the expected set. Missing children are CRITICAL; unexpected extras are
//! HIGH. The diagnosis travels as data on the score record; whether it aborts
//! the run is the orchestrator's decision.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HermeticityDiagnosis {
    pub expected_ids: BTreeSet<String>,
    pub actual_ids: BTreeSet<String>,
    pub missing_ids: BTreeSet<String>,
    pub extra_ids: BTreeSet<String>,
    pub is_hermetic: bool,
    pub severity: Severity,
    pub remediation_hint: String,
}

impl HermeticityDiagnosis {
    /// Compare actual child ids against the expected set. `kind` names the
    /// children ("dimension", "cluster") and `owner` the parent group in hints.
    pub fn diagnose<'a, E, A>(expected: E, actual: A, kind: &str, owner: &str) -> Self
    where
        E: IntoIterator<Item = &'a str>,
        A: IntoIterator<Item = &'a str>,
    {
        let expected_ids: BTreeSet<String> = expected.into_iter().map(str::to_string).collect();
        let actual_ids: BTreeSet<String> = actual.into_iter().map(str::to_string).collect();
        let missing_ids: BTreeSet<String> = expected_ids.difference(&actual_ids).cloned().collect();
        let extra_ids: BTreeSet<String> = actual_ids.difference(&expected_ids).cloned().collect();

        let is_hermetic = missing_ids.is_empty() && extra_ids.is_empty();
        let severity = if !missing_ids.is_empty() {
            Severity::Critical
        } else if !extra_ids.is_empty() {
            Severity::High
        } else {
            Severity::Low
        };

        let mut hints = Vec::new();
        for id in &missing_ids {
            hints.push(format!("provide {kind} {id} for {owner}"));
        }
        if !extra_ids.is_empty() {
            let extras: Vec<&str> = extra_ids.iter().map(String::as_str).collect();
            hints.push(format!(
                "remove or declare unexpected {kind}(s) {} in {owner}",
                extras.join(", ")
            ));
        }
        let remediation_hint = if hints.is_empty() {
            "no action required".to_string()
        } else {
            hints.join("; ")
        };

        Self {
            expected_ids,
            actual_ids,
            missing_ids,
            extra_ids,
            is_hermetic,
            severity,
            remediation_hint,
        }
    }

    /// One-line summary for logs and validation messages.
    pub fn summary(&self) -> String {
        if self.is_hermetic {
            return "hermetic".to_string();
        }
        let join = |s: &BTreeSet<String>| s.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
        format!(
            "{} missing [{}], extra [{}]",
            self.severity,
            join(&self.missing_ids),
            join(&self.extra_ids)
        )
    }
}
