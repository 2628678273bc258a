use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminator carried in the `type` field of every trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "run.start")]
    RunStart,
    #[serde(rename = "run.end")]
    RunEnd,
    #[serde(rename = "step.start")]
    StepStart,
    #[serde(rename = "step.end")]
    StepEnd,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::RunStart,
        EventType::RunEnd,
        EventType::StepStart,
        EventType::StepEnd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RunStart => "run.start",
            EventType::RunEnd => "run.end",
            EventType::StepStart => "step.start",
            EventType::StepEnd => "step.end",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// One trace event as it travels on the wire to `POST /v1/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "run.start")]
    RunStart {
        run_id: String,
        ts: String,
        project_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runbook: Option<String>,
    },
    #[serde(rename = "run.end")]
    RunEnd {
        run_id: String,
        ts: String,
        totals: RunTotals,
    },
    #[serde(rename = "step.start")]
    StepStart {
        run_id: String,
        ts: String,
        step_id: String,
        index: i64,
        name: String,
        tool: String,
        input: Map<String, Value>,
    },
    #[serde(rename = "step.end")]
    StepEnd {
        run_id: String,
        ts: String,
        step_id: String,
        output: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency_ms: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost_usd: Option<f64>,
        status: StepOutcome,
    },
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::RunStart { .. } => EventType::RunStart,
            Event::RunEnd { .. } => EventType::RunEnd,
            Event::StepStart { .. } => EventType::StepStart,
            Event::StepEnd { .. } => EventType::StepEnd,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Event::RunStart { run_id, .. }
            | Event::RunEnd { run_id, .. }
            | Event::StepStart { run_id, .. }
            | Event::StepEnd { run_id, .. } => run_id,
        }
    }
}

/// Body of `POST /v1/events`. Order of `events` is the submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub events: Vec<Event>,
}
