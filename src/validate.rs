//! Client-side schema checks for a trace-event batch.
//!
//! Every event is checked on its own and every violation is reported; nothing
//! here stops at the first problem. Whether diagnostics block submission is the
//! caller's decision.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::events::EventType;
use crate::timestamp::parse_timestamp;

/// The payload is not `{ "events": [...] }`; no event was looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralError;

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Body must be an object with an events array.")
    }
}

impl std::error::Error for StructuralError {}

/// One violated field-level rule.
///
/// Renders as `Event n (type): "field" message.` The `(type)` tag appears
/// whenever the event's type is recognised, base fields (`run_id`, `ts`)
/// included; it is left out only when the type itself is missing or unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// 1-based position of the event in the batch.
    pub position: usize,
    pub event_type: Option<EventType>,
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event {}", self.position)?;
        if let Some(t) = self.event_type {
            write!(f, " ({t})")?;
        }
        match &self.field {
            Some(field) => write!(f, ": \"{field}\" {}.", self.message),
            None => write!(f, ": {}.", self.message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Present and truthy.
    Required(&'static str),
    Object(&'static str),
    Integer(&'static str),
    /// When present: a number, and not below zero.
    OptionalNumber(&'static str),
    OptionalString(&'static str),
    OneOf(&'static str, &'static [&'static str]),
}

const RUN_START: &[Rule] = &[Rule::Required("project_id"), Rule::OptionalString("runbook")];

const RUN_END: &[Rule] = &[
    Rule::Object("totals"),
    Rule::OptionalNumber("totals.tokens"),
    Rule::OptionalNumber("totals.cost_usd"),
];

const STEP_START: &[Rule] = &[
    Rule::Required("step_id"),
    Rule::Integer("index"),
    Rule::Required("name"),
    Rule::Required("tool"),
    Rule::Object("input"),
];

const STEP_END: &[Rule] = &[
    Rule::Required("step_id"),
    Rule::Object("output"),
    Rule::OptionalNumber("latency_ms"),
    Rule::OptionalNumber("tokens"),
    Rule::OptionalNumber("cost_usd"),
    Rule::OneOf("status", &["ok", "error"]),
];

fn rules_for(t: EventType) -> &'static [Rule] {
    match t {
        EventType::RunStart => RUN_START,
        EventType::RunEnd => RUN_END,
        EventType::StepStart => STEP_START,
        EventType::StepEnd => STEP_END,
    }
}

/// Validates a batch and renders every diagnostic as a display string.
pub fn validate(events: &[Value]) -> Vec<String> {
    validate_events(events)
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Checks the `{ "events": [...] }` envelope, then every event in it.
pub fn validate_payload(payload: &Value) -> Result<Vec<Diagnostic>, StructuralError> {
    let events = payload
        .as_object()
        .and_then(|obj| obj.get("events"))
        .and_then(Value::as_array)
        .ok_or(StructuralError)?;
    Ok(validate_events(events))
}

pub fn validate_events(events: &[Value]) -> Vec<Diagnostic> {
    events
        .iter()
        .enumerate()
        .flat_map(|(i, ev)| validate_event(ev, i + 1))
        .collect()
}

/// Diagnostics for a single event at 1-based `position`.
pub fn validate_event(event: &Value, position: usize) -> Vec<Diagnostic> {
    let Some(obj) = event.as_object() else {
        return vec![Diagnostic {
            position,
            event_type: None,
            field: None,
            message: "must be an object".into(),
        }];
    };

    let event_type = obj.get("type").and_then(Value::as_str).and_then(EventType::parse);
    let mut out = Checker { obj, position, event_type, diags: Vec::new() };

    if event_type.is_none() {
        let tags: Vec<&str> = EventType::ALL.iter().map(|t| t.as_str()).collect();
        out.push("type", format!("must be one of {}", tags.join(", ")));
    }

    if !obj.get("run_id").is_some_and(is_truthy) {
        out.push("run_id", "is required");
    }

    let ts_ok = obj
        .get("ts")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .is_some();
    if !ts_ok {
        out.push("ts", "must be a valid ISO datetime");
    }

    if let Some(t) = event_type {
        for rule in rules_for(t) {
            out.apply(*rule);
        }
    }

    out.diags
}

struct Checker<'a> {
    obj: &'a Map<String, Value>,
    position: usize,
    event_type: Option<EventType>,
    diags: Vec<Diagnostic>,
}

impl<'a> Checker<'a> {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.diags.push(Diagnostic {
            position: self.position,
            event_type: self.event_type,
            field: Some(field.to_string()),
            message: message.into(),
        });
    }

    /// Resolves `a.b` paths one object level at a time.
    fn lookup(&self, path: &str) -> Option<&'a Value> {
        let mut parts = path.split('.');
        let mut cur = self.obj.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    fn apply(&mut self, rule: Rule) {
        match rule {
            Rule::Required(field) => {
                if !self.lookup(field).is_some_and(is_truthy) {
                    self.push(field, "is required");
                }
            }
            Rule::Object(field) => {
                if !self.lookup(field).is_some_and(Value::is_object) {
                    self.push(field, "object is required");
                }
            }
            Rule::Integer(field) => match self.lookup(field).and_then(Value::as_f64) {
                None => self.push(field, "must be a number"),
                Some(n) if n.fract() != 0.0 => self.push(field, "must be an integer"),
                Some(_) => {}
            },
            Rule::OptionalNumber(field) => {
                let Some(v) = self.lookup(field) else { return };
                if !v.is_number() {
                    self.push(field, "must be a number");
                }
                // Bound check reads the value numerically on its own, so a
                // string like "-3" fails both checks.
                if numeric_reading(v).is_some_and(|n| n < 0.0) {
                    self.push(field, "must be >= 0");
                }
            }
            Rule::OptionalString(field) => {
                if self.lookup(field).is_some_and(|v| !v.is_string()) {
                    self.push(field, "must be a string");
                }
            }
            Rule::OneOf(field, allowed) => {
                let ok = self
                    .lookup(field)
                    .and_then(Value::as_str)
                    .is_some_and(|s| allowed.contains(&s));
                if !ok {
                    let quoted: Vec<String> = allowed.iter().map(|a| format!("\"{a}\"")).collect();
                    self.push(field, format!("must be {}", quoted.join(" or ")));
                }
            }
        }
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn numeric_reading(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn well_formed() -> Vec<Value> {
        vec![
            json!({"type": "run.start", "run_id": "r1", "ts": "2026-01-01T00:00:00Z", "project_id": "p1", "runbook": "default-runbook"}),
            json!({"type": "step.start", "run_id": "r1", "ts": "2026-01-01T00:00:01Z", "step_id": "s1", "index": 1, "name": "Knowledge Retrieval", "tool": "retriever_v2", "input": {"query": "Reset MFA instructions"}}),
            json!({"type": "step.end", "run_id": "r1", "ts": "2026-01-01T00:00:02Z", "step_id": "s1", "output": {"result": "ok"}, "latency_ms": 420, "tokens": 240, "cost_usd": 0.004, "status": "ok"}),
            json!({"type": "run.end", "run_id": "r1", "ts": "2026-01-01T00:00:03Z", "totals": {"tokens": 240, "cost_usd": 0.004}}),
        ]
    }

    #[test]
    fn well_formed_batch_is_clean_every_time() {
        let batch = well_formed();
        assert!(validate(&batch).is_empty());
        assert_eq!(validate(&batch), validate(&batch));
    }

    #[test]
    fn out_of_order_batch_is_still_clean() {
        let mut batch = well_formed();
        batch.swap(1, 2);
        assert!(validate(&batch).is_empty());
    }

    #[test]
    fn run_start_without_project_reports_only_that() {
        let batch = vec![json!({"type": "run.start", "run_id": "r1", "ts": "2026-01-01T00:00:00Z"})];
        assert_eq!(validate(&batch), vec![r#"Event 1 (run.start): "project_id" is required."#.to_string()]);
    }

    #[test]
    fn missing_run_id_and_ts_are_always_named() {
        for mut ev in well_formed() {
            let obj = ev.as_object_mut().unwrap();
            obj.remove("run_id");
            obj.remove("ts");
            let diags = validate(&[ev]);
            assert!(diags.iter().any(|d| d.contains("\"run_id\" is required")), "{diags:?}");
            assert!(diags.iter().any(|d| d.contains("\"ts\" must be a valid ISO datetime")), "{diags:?}");
        }
    }

    #[test]
    fn falsy_run_id_and_bad_ts_are_flagged() {
        let ev = json!({"type": "run.start", "run_id": "", "ts": "not a date", "project_id": "p1"});
        assert_eq!(
            validate(&[ev]),
            vec![
                r#"Event 1 (run.start): "run_id" is required."#.to_string(),
                r#"Event 1 (run.start): "ts" must be a valid ISO datetime."#.to_string(),
            ]
        );
        let numeric_id = json!({"type": "run.end", "run_id": 7, "ts": "2026-01-01", "totals": {}});
        assert!(validate(&[numeric_id]).is_empty());
    }

    #[test]
    fn unknown_type_skips_variant_rules_but_keeps_base_rules() {
        let ev = json!({"type": "run.pause", "ts": "2026-01-01T00:00:00Z"});
        assert_eq!(
            validate(&[ev]),
            vec![
                r#"Event 1: "type" must be one of run.start, run.end, step.start, step.end."#.to_string(),
                r#"Event 1: "run_id" is required."#.to_string(),
            ]
        );
    }

    #[test]
    fn non_object_event_gets_single_diagnostic() {
        let batch = vec![json!("run.start"), json!(null)];
        assert_eq!(
            validate(&batch),
            vec!["Event 1: must be an object.".to_string(), "Event 2: must be an object.".to_string()]
        );
    }

    #[test]
    fn negative_latency_yields_exactly_one_latency_diagnostic() {
        let mut ev = well_formed()[2].clone();
        ev["latency_ms"] = json!(-5);
        ev["tokens"] = json!("lots");
        ev["cost_usd"] = json!(-0.5);
        let diags = validate(&[ev]);
        let latency: Vec<_> = diags.iter().filter(|d| d.contains("\"latency_ms\"")).collect();
        assert_eq!(latency, vec![r#"Event 1 (step.end): "latency_ms" must be >= 0."#]);
        assert!(diags.contains(&r#"Event 1 (step.end): "tokens" must be a number."#.to_string()));
        assert!(diags.contains(&r#"Event 1 (step.end): "cost_usd" must be >= 0."#.to_string()));
    }

    #[test]
    fn negative_numeric_string_fails_type_and_bound() {
        let mut ev = well_formed()[2].clone();
        ev["tokens"] = json!("-3");
        let diags = validate(&[ev]);
        assert_eq!(
            diags,
            vec![
                r#"Event 1 (step.end): "tokens" must be a number."#.to_string(),
                r#"Event 1 (step.end): "tokens" must be >= 0."#.to_string(),
            ]
        );
    }

    #[test]
    fn step_start_variant_rules() {
        let ev = json!({"type": "step.start", "run_id": "r1", "ts": "2026-01-01T00:00:00Z", "index": 1.5, "input": []});
        assert_eq!(
            validate(&[ev]),
            vec![
                r#"Event 1 (step.start): "step_id" is required."#.to_string(),
                r#"Event 1 (step.start): "index" must be an integer."#.to_string(),
                r#"Event 1 (step.start): "name" is required."#.to_string(),
                r#"Event 1 (step.start): "tool" is required."#.to_string(),
                r#"Event 1 (step.start): "input" object is required."#.to_string(),
            ]
        );
        let ev = json!({"type": "step.start", "run_id": "r1", "ts": "2026-01-01T00:00:00Z", "step_id": "s", "index": "1", "name": "n", "tool": "t", "input": {}});
        assert_eq!(validate(&[ev]), vec![r#"Event 1 (step.start): "index" must be a number."#.to_string()]);
    }

    #[test]
    fn step_end_status_and_output() {
        let ev = json!({"type": "step.end", "run_id": "r1", "ts": "2026-01-01T00:00:00Z", "step_id": "s1", "status": "done"});
        assert_eq!(
            validate(&[ev]),
            vec![
                r#"Event 1 (step.end): "output" object is required."#.to_string(),
                r#"Event 1 (step.end): "status" must be "ok" or "error"."#.to_string(),
            ]
        );
    }

    #[test]
    fn run_end_totals_are_checked() {
        let ev = json!({"type": "run.end", "run_id": "r1", "ts": "2026-01-01T00:00:00Z"});
        assert_eq!(validate(&[ev]), vec![r#"Event 1 (run.end): "totals" object is required."#.to_string()]);
        let ev = json!({"type": "run.end", "run_id": "r1", "ts": "2026-01-01T00:00:00Z", "totals": {"tokens": -1}});
        assert_eq!(validate(&[ev]), vec![r#"Event 1 (run.end): "totals.tokens" must be >= 0."#.to_string()]);
    }

    #[test]
    fn positions_are_one_based_across_batch() {
        let mut batch = well_formed();
        batch[3].as_object_mut().unwrap().remove("totals");
        let diags = validate_events(&batch);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].position, 4);
        assert_eq!(diags[0].event_type, Some(EventType::RunEnd));
        assert_eq!(diags[0].field.as_deref(), Some("totals"));
    }

    #[test]
    fn payload_envelope_is_structural() {
        assert_eq!(validate_payload(&json!([])), Err(StructuralError));
        assert_eq!(validate_payload(&json!({"events": {}})), Err(StructuralError));
        assert_eq!(
            StructuralError.to_string(),
            "Body must be an object with an events array."
        );
        let ok = validate_payload(&json!({"events": well_formed()})).unwrap();
        assert!(ok.is_empty());
    }
}
