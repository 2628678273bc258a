use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::events::{Event, IngestRequest, RunTotals, StepOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct SamplePayload {
    pub title: &'static str,
    pub description: &'static str,
    pub data: IngestRequest,
}

fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn object(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

/// One run with a single retrieval step. With `out_of_order` the step's end
/// is submitted before its start, which the backend must still accept.
pub fn preset(out_of_order: bool) -> IngestRequest {
    let run_id = Uuid::new_v4().to_string();
    let step_id = Uuid::new_v4().to_string();

    let run_start = Event::RunStart {
        run_id: run_id.clone(),
        ts: now_ts(),
        project_id: "shortify".into(),
        runbook: Some("default-runbook".into()),
    };
    let step_start = Event::StepStart {
        run_id: run_id.clone(),
        ts: now_ts(),
        step_id: step_id.clone(),
        index: 1,
        name: "Knowledge Retrieval".into(),
        tool: "retriever_v2".into(),
        input: object(json!({ "query": "Reset MFA instructions" })),
    };
    let step_end = Event::StepEnd {
        run_id: run_id.clone(),
        ts: now_ts(),
        step_id,
        output: object(json!({ "result": "MFA reset instructions" })),
        latency_ms: Some(420.0),
        tokens: Some(240),
        cost_usd: Some(0.004),
        status: StepOutcome::Ok,
    };
    let run_end = Event::RunEnd {
        run_id,
        ts: now_ts(),
        totals: RunTotals { tokens: Some(240), cost_usd: Some(0.004) },
    };

    let events = if out_of_order {
        vec![run_start, step_end, step_start, run_end]
    } else {
        vec![run_start, step_start, step_end, run_end]
    };
    IngestRequest { events }
}

pub fn sample_payloads() -> Vec<SamplePayload> {
    vec![
        SamplePayload {
            title: "Minimal happy path",
            description: "run.start → step.start → step.end → run.end",
            data: preset(false),
        },
        SamplePayload {
            title: "Out-of-order",
            description: "run.start → step.end → step.start → run.end",
            data: preset(true),
        },
    ]
}
