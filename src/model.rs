use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Warning,
    Running,
    Error,
    Unknown,
}

impl RunStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "passed" => RunStatus::Passed,
            "failed" => RunStatus::Failed,
            "warning" => RunStatus::Warning,
            "running" => RunStatus::Running,
            "error" => RunStatus::Error,
            _ => RunStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Warning => "warning",
            RunStatus::Running => "running",
            RunStatus::Error => "error",
            RunStatus::Unknown => "unknown",
        }
    }
}

/// `None` means no validation has run yet; it is never a backend verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Failed,
    Warning,
    None,
    Unknown,
}

impl ValidationStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "passed" => ValidationStatus::Passed,
            "failed" => ValidationStatus::Failed,
            "warning" => ValidationStatus::Warning,
            "none" => ValidationStatus::None,
            _ => ValidationStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    /// Position within the run; `-1` when the backend could not place it.
    pub index: i64,
    pub name: String,
    pub tool: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_json: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_json: Option<Map<String, Value>>,
}

/// Canonical run as every consumer sees it, whatever the backend sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub project_id: String,
    pub project: String,
    pub runbook: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    pub validation_status: ValidationStatus,
    pub latest_validation_status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_validation_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<RunStep>>,
}

/// Pagination fields are `None` when the backend did not say; absent is
/// "unknown", not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunsResponse {
    pub runs: Vec<Run>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ValidationStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub findings: Vec<ValidationFinding>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_runs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<String>,
    pub status_counts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_validation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_validation_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_validation_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub db: Option<String>,
}

/// `status` and `ingested` arrive as either numbers or strings/bools
/// depending on backend version, so they stay loosely typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestEventsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statuses_parse_leniently() {
        assert_eq!(RunStatus::parse("passed"), RunStatus::Passed);
        assert_eq!(RunStatus::parse("queued"), RunStatus::Unknown);
        assert_eq!(ValidationStatus::parse("none"), ValidationStatus::None);
        assert_eq!(ValidationStatus::parse("skipped"), ValidationStatus::Unknown);
        assert_eq!(serde_json::to_value(ValidationStatus::None).unwrap(), json!("none"));
    }

    #[test]
    fn ingest_response_tolerates_partial_bodies() {
        let r: IngestEventsResponse = serde_json::from_value(json!({"ingested": true})).unwrap();
        assert_eq!(r.ingested, Some(json!(true)));
        assert!(r.errors.is_empty());
        let r: IngestEventsResponse =
            serde_json::from_value(json!({"status": 202, "ingested": 4, "failed": 0, "warnings": ["late event"]})).unwrap();
        assert_eq!(r.failed, Some(0));
        assert_eq!(r.warnings, vec!["late event"]);
    }

    #[test]
    fn project_summary_defaults_missing_fields() {
        let s: ProjectSummary =
            serde_json::from_value(json!({"total_runs": 3, "status_counts": {"passed": 2, "failed": 1}})).unwrap();
        assert_eq!(s.total_runs, Some(3));
        assert_eq!(s.status_counts.get("passed"), Some(&2));
        assert!(s.last_run_at.is_none());
    }
}
