//! Normalized anomaly context for one observability event.
//!
//! A single logical event may be split over several raw records: the main
//! prompt/response record plus independent detector records (PII, TF-IDF,
//! guardrails). Records are merged field by field, the latest non-null value
//! winning, ordered by `_time`.
//!
//! Field names are looked up through ordered alias lists. The order is part
//! of the contract: the first alias with a non-blank value wins.

use crate::finding::Finding;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// One raw record as returned by the event source
pub type RawRecord = Map<String, Value>;

/// Event identifier spellings, in priority order
pub const EVENT_ID_FIELDS: &[&str] = &["gen_ai.event.id", "gen_ai_event_id", "event_id"];

/// Service/application name spellings, in priority order
pub const SERVICE_FIELDS: &[&str] = &[
    "gen_ai.app.name",
    "gen_ai.service.name",
    "service.name",
    "service_name",
];

/// Service name spellings on the record that triggered processing. The
/// service field outranks the app field here, unlike the merged context.
pub const RECORD_SERVICE_FIELDS: &[&str] = &[
    "gen_ai.service.name",
    "gen_ai.app.name",
    "service_name",
    "service.name",
];

/// Model name spellings
pub const MODEL_FIELDS: &[&str] = &["gen_ai.request.model"];

/// User prompt spellings, in priority order
pub const PROMPT_FIELDS: &[&str] = &["gen_ai.input.messages", "gen_ai.prompt", "input_messages"];

/// Model response spellings, in priority order
pub const RESPONSE_FIELDS: &[&str] = &[
    "gen_ai.output.messages",
    "gen_ai.response",
    "output_messages",
];

/// Event timestamp field
pub const TIME_FIELD: &str = "_time";

/// Prompt and response are cut to this many characters
pub const MAX_TEXT_CHARS: usize = 1000;

/// Appended to text cut by [`truncate_text`]
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// String form of a field. `None` for missing, null or blank values.
pub fn field_text(record: &RawRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// First non-blank value among `aliases`
pub fn first_field(record: &RawRecord, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| field_text(record, key))
}

/// Event id of a record, surrounding whitespace removed
pub fn event_id_of(record: &RawRecord) -> Option<String> {
    first_field(record, EVENT_ID_FIELDS).map(|id| id.trim().to_string())
}

/// Detector flags arrive as JSON booleans or as "true"/"false" strings.
pub fn is_truthy(record: &RawRecord, key: &str) -> bool {
    match record.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// `_time` as epoch seconds. Accepts numbers, numeric strings and RFC 3339.
pub fn record_epoch(record: &RawRecord) -> Option<f64> {
    match record.get(TIME_FIELD)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|t| t.timestamp() as f64)
            })
        }
        _ => None,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Merge records into one, latest non-null value per field.
///
/// Records without a parseable `_time` sort before timed ones; ties keep
/// input order.
pub fn merge_latest<'a, I>(records: I) -> RawRecord
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    let mut ordered: Vec<&RawRecord> = records.into_iter().collect();
    ordered.sort_by(|a, b| {
        record_epoch(a)
            .partial_cmp(&record_epoch(b))
            .unwrap_or(Ordering::Equal)
    });

    let mut merged = RawRecord::new();
    for record in ordered {
        for (key, value) in record {
            if is_present(value) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Cut `text` to `max_chars` characters, appending [`TRUNCATION_MARKER`].
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}{}", kept, TRUNCATION_MARKER)
}

/// Detect findings in a merged record, in the fixed detection order.
pub fn detect_findings(record: &RawRecord) -> Vec<Finding> {
    let mut findings = Vec::new();

    if is_truthy(record, "gen_ai.pii.detected") {
        findings.push(Finding::Pii {
            types: field_text(record, "gen_ai.pii.types"),
        });
    }
    if is_truthy(record, "gen_ai.safety.violated") {
        findings.push(Finding::SafetyViolation {
            category: field_text(record, "gen_ai.safety.category"),
        });
    }
    if is_truthy(record, "gen_ai.policy.blocked") {
        findings.push(Finding::PolicyBlock {
            policy: field_text(record, "gen_ai.policy.name"),
        });
    }
    if is_truthy(record, "gen_ai.prompt.is_anomaly") {
        findings.push(Finding::PromptAnomaly {
            score: field_text(record, "gen_ai.prompt.anomaly_score"),
        });
    }
    if is_truthy(record, "gen_ai.response.is_anomaly") {
        findings.push(Finding::ResponseAnomaly {
            score: field_text(record, "gen_ai.response.anomaly_score"),
        });
    }
    if let Some(level) = field_text(record, "gen_ai.tfidf.risk_level") {
        let upper = level.trim().to_uppercase();
        if upper == "HIGH" || upper == "CRITICAL" {
            findings.push(Finding::HighRisk { level: Some(level) });
        }
    }
    if is_truthy(record, "gen_ai.guardrail.triggered") {
        findings.push(Finding::GuardrailTrigger {
            guardrail: field_text(record, "gen_ai.guardrail.name"),
        });
    }

    findings
}

/// Normalized, read-only view of one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub event_id: String,
    pub service_name: Option<String>,
    pub model_name: Option<String>,
    /// Raw `_time` value of the latest record
    pub timestamp: Option<String>,
    pub findings: Vec<Finding>,
    /// Already truncated to [`MAX_TEXT_CHARS`]
    pub prompt_text: Option<String>,
    /// Already truncated to [`MAX_TEXT_CHARS`]
    pub response_text: Option<String>,
}

impl EventContext {
    /// Context with nothing but the identifier
    pub fn empty(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            service_name: None,
            model_name: None,
            timestamp: None,
            findings: Vec::new(),
            prompt_text: None,
            response_text: None,
        }
    }

    /// Group `records` by event id and merge those belonging to `event_id`.
    pub fn from_records(event_id: &str, records: &[RawRecord]) -> Self {
        let related = records
            .iter()
            .filter(|r| event_id_of(r).as_deref() == Some(event_id.trim()));
        Self::from_merged(event_id, &merge_latest(related))
    }

    /// Build from an already merged record
    pub fn from_merged(event_id: &str, merged: &RawRecord) -> Self {
        Self {
            event_id: event_id.trim().to_string(),
            service_name: first_field(merged, SERVICE_FIELDS),
            model_name: first_field(merged, MODEL_FIELDS),
            timestamp: field_text(merged, TIME_FIELD),
            findings: detect_findings(merged),
            prompt_text: first_field(merged, PROMPT_FIELDS)
                .map(|t| truncate_text(&t, MAX_TEXT_CHARS)),
            response_text: first_field(merged, RESPONSE_FIELDS)
                .map(|t| truncate_text(&t, MAX_TEXT_CHARS)),
        }
    }

    /// False when the event source gave us nothing usable
    pub fn has_details(&self) -> bool {
        self.service_name.is_some()
            || self.model_name.is_some()
            || self.timestamp.is_some()
            || self.prompt_text.is_some()
            || self.response_text.is_some()
            || !self.findings.is_empty()
    }

    pub fn finding_labels(&self) -> Vec<String> {
        self.findings.iter().map(Finding::label).collect()
    }

    pub fn service_display(&self) -> &str {
        self.service_name.as_deref().unwrap_or("Unknown")
    }

    pub fn model_display(&self) -> &str {
        self.model_name.as_deref().unwrap_or("Unknown")
    }

    pub fn timestamp_display(&self) -> &str {
        self.timestamp.as_deref().unwrap_or("Unknown")
    }

    /// Plain-text rendering handed to the summarization backend
    pub fn render(&self) -> String {
        let issues = if self.findings.is_empty() {
            "No anomalies detected".to_string()
        } else {
            self.finding_labels().join("\n")
        };

        [
            "Event Details:".to_string(),
            format!("- Event ID: {}", self.event_id),
            format!("- Service: {}", self.service_display()),
            format!("- Model: {}", self.model_display()),
            format!("- Timestamp: {}", self.timestamp_display()),
            String::new(),
            "Detected Issues:".to_string(),
            issues,
            String::new(),
            "User Prompt:".to_string(),
            self.prompt_text.clone().unwrap_or_else(|| "Not available".to_string()),
            String::new(),
            "AI Response:".to_string(),
            self.response_text.clone().unwrap_or_else(|| "Not available".to_string()),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_alias_priority() {
        let r = record(json!({
            "event_id": "low",
            "gen_ai_event_id": "mid",
            "gen_ai.event.id": "high",
        }));
        assert_eq!(first_field(&r, EVENT_ID_FIELDS).as_deref(), Some("high"));

        let r = record(json!({"gen_ai.event.id": "  ", "event_id": "fallback"}));
        assert_eq!(first_field(&r, EVENT_ID_FIELDS).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_merge_latest_non_null_wins() {
        let main = record(json!({
            "_time": 100,
            "gen_ai.event.id": "e1",
            "gen_ai.prompt": "hello",
            "gen_ai.pii.detected": "false",
        }));
        let detector = record(json!({
            "_time": 200,
            "gen_ai.event.id": "e1",
            "gen_ai.prompt": null,
            "gen_ai.pii.detected": "true",
            "gen_ai.pii.types": "email",
        }));
        // Input order reversed on purpose: ordering comes from _time
        let merged = merge_latest([&detector, &main]);
        assert_eq!(field_text(&merged, "gen_ai.prompt").as_deref(), Some("hello"));
        assert_eq!(field_text(&merged, "gen_ai.pii.detected").as_deref(), Some("true"));
        assert_eq!(field_text(&merged, TIME_FIELD).as_deref(), Some("200"));
    }

    #[test]
    fn test_record_epoch_formats() {
        assert_eq!(record_epoch(&record(json!({"_time": 12}))), Some(12.0));
        assert_eq!(record_epoch(&record(json!({"_time": "12.5"}))), Some(12.5));
        assert_eq!(
            record_epoch(&record(json!({"_time": "1970-01-01T00:01:00+00:00"}))),
            Some(60.0)
        );
        assert_eq!(record_epoch(&record(json!({"_time": "yesterday"}))), None);
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        let long = "é".repeat(1200);
        let cut = truncate_text(&long, MAX_TEXT_CHARS);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            cut.chars().count(),
            MAX_TEXT_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_detection_order() {
        let r = record(json!({
            "gen_ai.guardrail.triggered": true,
            "gen_ai.guardrail.name": "jailbreak",
            "gen_ai.tfidf.risk_level": "critical",
            "gen_ai.pii.detected": "TRUE",
            "gen_ai.safety.violated": "false",
        }));
        let labels: Vec<String> = detect_findings(&r).iter().map(Finding::label).collect();
        assert_eq!(
            labels,
            vec![
                "PII DETECTED: unknown types",
                "HIGH RISK LEVEL: critical",
                "GUARDRAIL TRIGGERED: jailbreak",
            ]
        );
    }

    #[test]
    fn test_low_risk_level_is_not_a_finding() {
        let r = record(json!({"gen_ai.tfidf.risk_level": "LOW"}));
        assert!(detect_findings(&r).is_empty());
    }

    #[test]
    fn test_from_records_ignores_other_events() {
        let records = vec![
            record(json!({"gen_ai.event.id": "e1", "gen_ai.request.model": "gpt-4o"})),
            record(json!({"gen_ai.event.id": "e2", "gen_ai.request.model": "other"})),
            record(json!({"event_id": "e1", "gen_ai.app.name": "support-bot"})),
        ];
        let ctx = EventContext::from_records("e1", &records);
        assert_eq!(ctx.model_name.as_deref(), Some("gpt-4o"));
        assert_eq!(ctx.service_name.as_deref(), Some("support-bot"));
    }

    #[test]
    fn test_padded_event_ids_match() {
        let records = vec![record(json!({"event_id": "  e1 ", "gen_ai.request.model": "m"}))];
        let ctx = EventContext::from_records(" e1", &records);
        assert_eq!(ctx.event_id, "e1");
        assert_eq!(ctx.model_name.as_deref(), Some("m"));
    }

    #[test]
    fn test_prompt_is_truncated() {
        let r = record(json!({"gen_ai.input.messages": "x".repeat(1500)}));
        let ctx = EventContext::from_merged("e1", &r);
        let prompt = ctx.prompt_text.unwrap();
        assert!(prompt.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_empty_context_render() {
        let ctx = EventContext::empty("e9");
        assert!(!ctx.has_details());
        let text = ctx.render();
        assert!(text.contains("- Event ID: e9"));
        assert!(text.contains("No anomalies detected"));
        assert!(text.contains("Not available"));
    }
}
