use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Run, RunStatus};
use crate::query::DateRange;
use crate::timestamp::parse_timestamp;

#[derive(Debug, Serialize)]
pub struct RunMetrics {
    pub total_runs: u64,
    pub passed_runs: u64,
    /// Percentage, 0..=100.
    pub pass_rate: f64,
    pub total_tokens: u64,
    pub avg_tokens: f64,
    pub total_cost: f64,
    pub by_status: BTreeMap<String, u64>,
    pub by_day: Vec<DayCount>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DayCount {
    pub day: String,
    pub total: u64,
}

/// Overview numbers over the runs that fall inside `range`.
pub fn compute_run_metrics(runs: &[Run], range: DateRange, now: DateTime<Utc>) -> RunMetrics {
    let mut total_runs: u64 = 0;
    let mut passed_runs: u64 = 0;
    let mut total_tokens: u64 = 0;
    let mut total_cost = 0.0;
    let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
    let mut days: BTreeMap<String, u64> = BTreeMap::new();

    for run in runs.iter().filter(|r| range.contains(r, now)) {
        total_runs += 1;
        if run.status == RunStatus::Passed {
            passed_runs += 1;
        }
        total_tokens += run.tokens.unwrap_or(0);
        total_cost += run.cost.unwrap_or(0.0);
        *by_status.entry(run.status.as_str().to_string()).or_insert(0) += 1;

        let day = run
            .started_at
            .as_deref()
            .and_then(parse_timestamp)
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        *days.entry(day).or_insert(0) += 1;
    }

    let (avg_tokens, pass_rate) = if total_runs > 0 {
        (
            total_tokens as f64 / total_runs as f64,
            passed_runs as f64 / total_runs as f64 * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    RunMetrics {
        total_runs,
        passed_runs,
        pass_rate,
        total_tokens,
        avg_tokens,
        total_cost,
        by_status,
        by_day: days.into_iter().map(|(day, total)| DayCount { day, total }).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_runs;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn computes_totals_inside_range() {
        let runs = normalize_runs(&json!({"runs": [
            {"id": "r1", "project_id": "p", "status": "passed", "started_at": "2026-03-10T08:00:00Z", "total_tokens": 100, "total_cost_usd": 0.25},
            {"id": "r2", "project_id": "p", "status": "failed", "started_at": "2026-03-09T20:00:00Z", "total_tokens": 300, "total_cost_usd": 0.75},
            {"id": "r3", "project_id": "p", "status": "passed", "started_at": "2026-02-01T00:00:00Z", "total_tokens": 5000},
            {"id": "r4", "project_id": "p", "status": "passed"}
        ]}))
        .runs;
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let m = compute_run_metrics(&runs, DateRange::Day, now);
        assert_eq!(m.total_runs, 3);
        assert_eq!(m.passed_runs, 2);
        assert!((m.pass_rate - 66.666).abs() < 0.01);
        assert_eq!(m.total_tokens, 400);
        assert!((m.avg_tokens - 133.333).abs() < 0.01);
        assert!((m.total_cost - 1.0).abs() < 1e-9);
        assert_eq!(m.by_status.get("passed"), Some(&2));
        assert_eq!(
            m.by_day,
            vec![
                DayCount { day: "2026-03-09".into(), total: 1 },
                DayCount { day: "2026-03-10".into(), total: 1 },
                DayCount { day: "Unknown".into(), total: 1 },
            ]
        );
    }

    #[test]
    fn empty_input_has_zero_rates() {
        let m = compute_run_metrics(&[], DateRange::Month, Utc::now());
        assert_eq!(m.total_runs, 0);
        assert_eq!(m.pass_rate, 0.0);
        assert!(m.by_day.is_empty());
    }
}
