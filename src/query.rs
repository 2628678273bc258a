use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::model::{Run, RunStatus, RunStep, RunValidation, RunsResponse, ValidationStatus};
use crate::timestamp::parse_timestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum DateRange {
    #[default]
    #[serde(rename = "24h")]
    #[value(name = "24h")]
    Day,
    #[serde(rename = "7d")]
    #[value(name = "7d")]
    Week,
    #[serde(rename = "30d")]
    #[value(name = "30d")]
    Month,
}

impl DateRange {
    pub fn span(self) -> Duration {
        match self {
            DateRange::Day => Duration::hours(24),
            DateRange::Week => Duration::days(7),
            DateRange::Month => Duration::days(30),
        }
    }

    /// Limit passed to the project summary endpoint for this range.
    pub fn summary_limit(self) -> u32 {
        match self {
            DateRange::Day => 24,
            DateRange::Week => 7,
            DateRange::Month => 30,
        }
    }

    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.span()
    }

    /// Runs without a readable start time are always in range.
    pub fn contains(self, run: &Run, now: DateTime<Utc>) -> bool {
        match run.started_at.as_deref().and_then(parse_timestamp) {
            Some(started) => started >= self.cutoff(now),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Tokens,
    Cost,
}

/// Client-side narrowing of a page of runs.
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    /// Case-insensitive substring of the run id.
    pub search: Option<String>,
    pub status: Option<RunStatus>,
    pub has_validation: bool,
    /// `"none"` selects runs without a runbook.
    pub runbook: Option<String>,
    pub range: Option<DateRange>,
    pub sort: SortOrder,
}

impl RunQuery {
    pub fn apply(&self, runs: &[Run], now: DateTime<Utc>) -> Vec<Run> {
        let needle = self.search.as_ref().map(|s| s.to_lowercase());
        let mut out: Vec<Run> = runs
            .iter()
            .filter(|r| needle.as_ref().map_or(true, |n| r.id.to_lowercase().contains(n.as_str())))
            .filter(|r| self.status.map_or(true, |s| r.status == s))
            .filter(|r| !self.has_validation || r.validation_status != ValidationStatus::None)
            .filter(|r| {
                self.runbook
                    .as_deref()
                    .map_or(true, |want| r.runbook.as_deref().unwrap_or("none") == want)
            })
            .filter(|r| self.range.map_or(true, |range| range.contains(r, now)))
            .cloned()
            .collect();

        let started = |r: &Run| {
            r.started_at
                .as_deref()
                .and_then(parse_timestamp)
                .map_or(0, |t| t.timestamp_millis())
        };
        match self.sort {
            SortOrder::Newest => out.sort_by_key(|r| std::cmp::Reverse(started(r))),
            SortOrder::Oldest => out.sort_by_key(started),
            SortOrder::Tokens => out.sort_by_key(|r| std::cmp::Reverse(r.tokens.unwrap_or(0))),
            SortOrder::Cost => out.sort_by(|a, b| {
                b.cost
                    .unwrap_or(0.0)
                    .partial_cmp(&a.cost.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }
        out
    }
}

/// Distinct runbook names across a page, in first-seen order.
pub fn runbooks(runs: &[Run]) -> Vec<String> {
    let mut seen = Vec::new();
    for name in runs.iter().filter_map(|r| r.runbook.as_ref()) {
        if !seen.contains(name) {
            seen.push(name.clone());
        }
    }
    seen
}

/// Presentation of a run's steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepQuery {
    /// Keep only `failed`/`error` steps.
    pub errors_only: bool,
}

impl StepQuery {
    /// Ascending by index; unplaced (`-1`) steps go last.
    pub fn apply(&self, steps: &[RunStep]) -> Vec<RunStep> {
        let mut out: Vec<RunStep> = steps
            .iter()
            .filter(|s| !self.errors_only || matches!(s.status, RunStatus::Failed | RunStatus::Error))
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.index == -1, s.index));
        out
    }
}

fn created_millis(v: &RunValidation) -> i64 {
    v.created_at
        .as_deref()
        .and_then(parse_timestamp)
        .map_or(0, |t| t.timestamp_millis())
}

/// Newest first; undated validations sort as oldest.
pub fn validations_newest_first(validations: &[RunValidation]) -> Vec<RunValidation> {
    let mut out = validations.to_vec();
    out.sort_by_key(|v| std::cmp::Reverse(created_millis(v)));
    out
}

/// The newest validation, or the verdict recorded on the run itself when the
/// list is empty. `None` when the run has never been validated.
pub fn latest_validation(validations: &[RunValidation], run: Option<&Run>) -> Option<RunValidation> {
    if let Some(newest) = validations_newest_first(validations).into_iter().next() {
        return Some(newest);
    }
    let run = run?;
    if run.latest_validation_status == ValidationStatus::None {
        return None;
    }
    Some(RunValidation {
        id: None,
        run_id: Some(run.id.clone()),
        status: run.latest_validation_status,
        created_at: run.latest_validation_at.clone(),
        findings: Vec::new(),
        warnings: Vec::new(),
        errors: Vec::new(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    pub page: u64,
    pub total_pages: u64,
    pub has_next: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl PageInfo {
    /// Without a backend `total`, a full page is taken to mean there may be more.
    pub fn compute(resp: &RunsResponse, limit: u64, offset: u64) -> Self {
        let limit = limit.max(1);
        let page = offset / limit + 1;
        let fetched = resp.runs.len() as u64;
        let has_next = match resp.total {
            Some(total) => offset + fetched < total,
            None => fetched == limit,
        };
        let total_pages = match resp.total {
            Some(total) => total.div_ceil(limit).max(1),
            None => page + u64::from(has_next),
        };
        Self { page, total_pages, has_next, total: resp.total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize_run, normalize_run_detail, normalize_runs, normalize_validations};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn sample() -> Vec<Run> {
        normalize_runs(&json!([
            {"id": "run-a", "project_id": "p1", "status": "passed", "runbook": "default", "started_at": "2026-03-10T10:00:00Z", "total_tokens": 100, "total_cost_usd": 0.5, "latest_validation_status": "passed"},
            {"id": "run-B", "project_id": "p1", "status": "failed", "started_at": "2026-03-05T10:00:00Z", "total_tokens": 900, "total_cost_usd": 0.1},
            {"id": "run-c", "project_id": "p1", "status": "passed", "runbook": "strict", "started_at": "2026-01-01T00:00:00Z", "total_tokens": 10, "total_cost_usd": 2.0},
            {"id": "run-d", "project_id": "p1", "status": "running"}
        ]))
        .runs
    }

    fn ids(runs: &[Run]) -> Vec<&str> {
        runs.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn default_query_sorts_newest_first_with_undated_last() {
        let out = RunQuery::default().apply(&sample(), now());
        assert_eq!(ids(&out), vec!["run-a", "run-B", "run-c", "run-d"]);
    }

    #[test]
    fn range_keeps_undated_runs() {
        let q = RunQuery { range: Some(DateRange::Week), ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-a", "run-B", "run-d"]);
        let q = RunQuery { range: Some(DateRange::Day), ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-a", "run-d"]);
    }

    #[test]
    fn filters_combine() {
        let q = RunQuery { search: Some("RUN-b".into()), ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-B"]);
        let q = RunQuery { status: Some(RunStatus::Passed), sort: SortOrder::Oldest, ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-c", "run-a"]);
        let q = RunQuery { has_validation: true, ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-a"]);
        let q = RunQuery { runbook: Some("none".into()), ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-B", "run-d"]);
    }

    #[test]
    fn sorts_by_tokens_and_cost() {
        let q = RunQuery { sort: SortOrder::Tokens, ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-B", "run-a", "run-c", "run-d"]);
        let q = RunQuery { sort: SortOrder::Cost, ..RunQuery::default() };
        assert_eq!(ids(&q.apply(&sample(), now())), vec!["run-c", "run-a", "run-B", "run-d"]);
    }

    #[test]
    fn runbook_names_are_distinct() {
        assert_eq!(runbooks(&sample()), vec!["default", "strict"]);
    }

    #[test]
    fn page_info_with_and_without_total() {
        let mut resp = RunsResponse { runs: sample(), total: Some(9), ..RunsResponse::default() };
        let p = PageInfo::compute(&resp, 4, 4);
        assert_eq!((p.page, p.total_pages, p.has_next), (2, 3, true));

        resp.total = None;
        let p = PageInfo::compute(&resp, 4, 0);
        assert_eq!((p.page, p.total_pages, p.has_next), (1, 2, true));
        let p = PageInfo::compute(&resp, 10, 0);
        assert_eq!((p.page, p.total_pages, p.has_next), (1, 1, false));
    }

    fn steps() -> Vec<RunStep> {
        normalize_run_detail(&json!({"id": "r1", "project_id": "p1", "steps": [
            {"index": 3, "name": "c", "status": "passed"},
            {"index": -1, "name": "orphan", "status": "error"},
            {"index": 1, "name": "a", "status": "failed"},
            {"index": 2, "name": "b", "status": "passed"}
        ]}))
        .and_then(|r| r.steps)
        .unwrap()
    }

    fn names(steps: &[RunStep]) -> Vec<&str> {
        steps.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn steps_order_by_index_with_unplaced_last() {
        assert_eq!(names(&StepQuery::default().apply(&steps())), vec!["a", "b", "c", "orphan"]);
    }

    #[test]
    fn errors_only_keeps_failed_and_error_steps() {
        let q = StepQuery { errors_only: true };
        assert_eq!(names(&q.apply(&steps())), vec!["a", "orphan"]);
    }

    #[test]
    fn latest_validation_prefers_newest_created_at() {
        let vals = normalize_validations(&json!([
            {"id": "v-old", "status": "passed", "created_at": "2026-03-01T00:00:00Z"},
            {"id": "v-undated", "status": "warning"},
            {"id": "v-new", "status": "failed", "created_at": "2026-03-09T00:00:00Z"}
        ]));
        let order: Vec<_> = validations_newest_first(&vals).into_iter().filter_map(|v| v.id).collect();
        assert_eq!(order, vec!["v-new", "v-old", "v-undated"]);
        let latest = latest_validation(&vals, None).unwrap();
        assert_eq!(latest.id.as_deref(), Some("v-new"));
        assert_eq!(latest.status, ValidationStatus::Failed);
    }

    #[test]
    fn latest_validation_falls_back_to_run_verdict() {
        let run = normalize_run(&json!({
            "id": "r1", "project_id": "p1",
            "latest_validation_status": "warning", "latest_validation_at": "2026-03-02T00:00:00Z"
        }))
        .unwrap();
        let latest = latest_validation(&[], Some(&run)).unwrap();
        assert_eq!(latest.status, ValidationStatus::Warning);
        assert_eq!(latest.run_id.as_deref(), Some("r1"));
        assert_eq!(latest.created_at.as_deref(), Some("2026-03-02T00:00:00Z"));

        let never = normalize_run(&json!({"id": "r2", "project_id": "p1"})).unwrap();
        assert_eq!(latest_validation(&[], Some(&never)), None);
        assert_eq!(latest_validation(&[], None), None);
    }
}
