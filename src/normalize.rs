//! Maps whatever envelope the backend answers with onto the canonical read
//! model. Nothing in here fails: unknown shapes degrade to empty collections
//! and items without identity are dropped rather than filled in.

use serde_json::{Map, Value};

use crate::model::{
    Project, Run, RunStatus, RunStep, RunValidation, RunsResponse, ValidationFinding,
    ValidationStatus,
};
use crate::timestamp::parse_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Projects,
    Runs,
    RunDetail,
    Validations,
}

impl ResourceKind {
    /// Envelope keys tried in order; the first present, non-null one wins.
    pub fn envelope_keys(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Projects => &["projects", "items", "data", "results"],
            ResourceKind::Runs => &["runs", "items", "data", "results"],
            ResourceKind::RunDetail => &["run", "data"],
            ResourceKind::Validations => &["validations", "items", "data", "results"],
        }
    }
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// The item list plus, when it came wrapped, the envelope it came in.
fn locate_list(data: &Value, kind: ResourceKind) -> Option<(&[Value], Option<&Map<String, Value>>)> {
    match data {
        Value::Array(items) => Some((items.as_slice(), None)),
        Value::Object(obj) => {
            let items = first_present(obj, kind.envelope_keys())?.as_array()?;
            Some((items.as_slice(), Some(obj)))
        }
        _ => None,
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| str_field(obj, k))
}

/// Non-negative whole number, whether the JSON spelled it `10` or `10.0`.
fn whole_number(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| {
        v.as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// Signed whole number; `-1` is a legitimate step index.
fn integer(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Token count; fractional readings are rounded rather than lost.
fn token_count(v: &Value) -> Option<u64> {
    whole_number(v).or_else(|| {
        v.as_f64()
            .filter(|f| *f >= 0.0 && f.is_finite() && *f <= u64::MAX as f64)
            .map(|f| f.round() as u64)
    })
}

pub fn normalize_projects(data: &Value) -> Vec<Project> {
    let Some((items, _)) = locate_list(data, ResourceKind::Projects) else {
        return Vec::new();
    };
    items.iter().filter_map(coerce_project).collect()
}

fn coerce_project(item: &Value) -> Option<Project> {
    if let Value::String(s) = item {
        if s.is_empty() {
            return None;
        }
        return Some(Project { id: s.clone(), name: s.clone(), description: None, created_at: None });
    }
    let obj = item.as_object()?;
    let id = first_str(obj, &["id", "project_id"]).filter(|id| !id.is_empty())?;
    let name = first_str(obj, &["name", "project_name"]).unwrap_or_else(|| id.clone());
    Some(Project {
        id,
        name,
        description: str_field(obj, "description"),
        created_at: str_field(obj, "created_at"),
    })
}

pub fn normalize_runs(data: &Value) -> RunsResponse {
    let Some((items, envelope)) = locate_list(data, ResourceKind::Runs) else {
        return RunsResponse::default();
    };
    let page = |key: &str| envelope.and_then(|e| e.get(key)).and_then(whole_number);
    RunsResponse {
        runs: items.iter().filter_map(normalize_run).collect(),
        total: page("total"),
        limit: page("limit"),
        offset: page("offset"),
    }
}

/// A single backend run. `None` unless both `id` and `project_id` are strings.
pub fn normalize_run(item: &Value) -> Option<Run> {
    let obj = item.as_object()?;
    let id = str_field(obj, "id")?;
    let project_id = str_field(obj, "project_id")?;

    let started_at = str_field(obj, "started_at");
    let ended_at = str_field(obj, "ended_at");
    let duration_ms = match (&started_at, &ended_at) {
        (Some(s), Some(e)) => duration_between(s, e),
        _ => None,
    };

    let validation = first_str(obj, &["latest_validation_status", "validation_status"])
        .map(|s| ValidationStatus::parse(&s))
        .unwrap_or(ValidationStatus::None);

    Some(Run {
        project: project_id.clone(),
        id,
        project_id,
        runbook: str_field(obj, "runbook"),
        status: str_field(obj, "status")
            .map(|s| RunStatus::parse(&s))
            .unwrap_or(RunStatus::Unknown),
        started_at,
        ended_at,
        duration_ms,
        tokens: first_present(obj, &["total_tokens", "tokens"]).and_then(token_count),
        cost: first_present(obj, &["total_cost_usd", "cost"]).and_then(Value::as_f64),
        validation_status: validation,
        latest_validation_status: validation,
        latest_validation_at: str_field(obj, "latest_validation_at"),
        steps: None,
    })
}

fn duration_between(started: &str, ended: &str) -> Option<u64> {
    let ms = (parse_timestamp(ended)? - parse_timestamp(started)?).num_milliseconds();
    u64::try_from(ms).ok()
}

/// Run detail with steps. Accepts the run itself or a `run`/`data` wrapper.
pub fn normalize_run_detail(data: &Value) -> Option<Run> {
    let obj = data.as_object()?;
    let inner = if obj.contains_key("id") {
        data
    } else {
        first_present(obj, ResourceKind::RunDetail.envelope_keys())?
    };
    let mut run = normalize_run(inner)?;
    let steps: Vec<RunStep> = inner
        .get("steps")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize_step).collect())
        .unwrap_or_default();
    run.steps = Some(steps);
    Some(run)
}

fn normalize_step(item: &Value) -> Option<RunStep> {
    let obj = item.as_object()?;
    let index = obj.get("index").and_then(integer)?;
    let object_field = |keys: &[&str]| first_present(obj, keys).and_then(Value::as_object).cloned();
    Some(RunStep {
        index,
        name: str_field(obj, "name").unwrap_or_default(),
        tool: str_field(obj, "tool").unwrap_or_default(),
        status: str_field(obj, "status")
            .map(|s| RunStatus::parse(&s))
            .unwrap_or(RunStatus::Unknown),
        latency_ms: obj.get("latency_ms").and_then(Value::as_f64),
        tokens: obj.get("tokens").and_then(token_count),
        cost: first_present(obj, &["cost_usd", "cost"]).and_then(Value::as_f64),
        input_json: object_field(&["input_json", "input"]),
        output_json: object_field(&["output_json", "output"]),
    })
}

pub fn normalize_validations(data: &Value) -> Vec<RunValidation> {
    let Some((items, _)) = locate_list(data, ResourceKind::Validations) else {
        return Vec::new();
    };
    items.iter().filter_map(normalize_validation).collect()
}

pub fn normalize_validation(item: &Value) -> Option<RunValidation> {
    let obj = item.as_object()?;
    let strings = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(Value::as_array)
            .map(|xs| xs.iter().filter_map(Value::as_str).map(str::to_owned).collect())
            .unwrap_or_default()
    };
    let findings = obj
        .get("findings")
        .and_then(Value::as_array)
        .map(|xs| {
            xs.iter()
                .filter_map(Value::as_object)
                .map(|f| ValidationFinding {
                    code: str_field(f, "code"),
                    msg: first_str(f, &["msg", "message"]),
                    status: str_field(f, "status").map(|s| ValidationStatus::parse(&s)),
                })
                .collect()
        })
        .unwrap_or_default();
    Some(RunValidation {
        id: str_field(obj, "id"),
        run_id: str_field(obj, "run_id"),
        status: str_field(obj, "status")
            .map(|s| ValidationStatus::parse(&s))
            .unwrap_or(ValidationStatus::Unknown),
        created_at: str_field(obj, "created_at"),
        findings,
        warnings: strings("warnings"),
        errors: strings("errors"),
    })
}
