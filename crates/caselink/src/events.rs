//! Event source collaborators and the context builder.

use caselink_shared::context::{event_id_of, record_epoch};
use caselink_shared::{EventContext, EventSourceError, RawRecord};
use chrono::Utc;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, warn};

const SECS_PER_DAY: i64 = 86_400;

/// Supplies raw records for one event
pub trait EventSource {
    /// Records carrying `event_id`, skipping those timed before `since`
    /// (epoch seconds). Records without a parseable time are kept.
    fn records(&self, event_id: &str, since: i64) -> Result<Vec<RawRecord>, EventSourceError>;
}

fn belongs(record: &RawRecord, event_id: &str, since: i64) -> bool {
    if event_id_of(record).as_deref() != Some(event_id.trim()) {
        return false;
    }
    match record_epoch(record) {
        Some(epoch) => epoch >= since as f64,
        None => true,
    }
}

/// JSON-lines export, one record object per line
pub struct JsonlEventSource {
    path: PathBuf,
}

impl JsonlEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EventSource for JsonlEventSource {
    fn records(&self, event_id: &str, since: i64) -> Result<Vec<RawRecord>, EventSourceError> {
        let file = File::open(&self.path).map_err(|e| {
            EventSourceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| EventSourceError::Unavailable(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(record)) => {
                    if belongs(&record, event_id, since) {
                        records.push(record);
                    }
                }
                Ok(_) => debug!("Skipping non-object event line {}", n + 1),
                Err(e) => debug!("Skipping malformed event line {}: {}", n + 1, e),
            }
        }

        Ok(records)
    }
}

/// Fixed set of records
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventSource {
    records: Vec<RawRecord>,
}

impl InMemoryEventSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

impl EventSource for InMemoryEventSource {
    fn records(&self, event_id: &str, since: i64) -> Result<Vec<RawRecord>, EventSourceError> {
        Ok(self
            .records
            .iter()
            .filter(|r| belongs(r, event_id, since))
            .cloned()
            .collect())
    }
}

/// Builds the normalized context of an event. Never fails.
pub struct ContextBuilder<'a> {
    source: &'a dyn EventSource,
    lookback_days: u32,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(source: &'a dyn EventSource, lookback_days: u32) -> Self {
        Self {
            source,
            lookback_days,
        }
    }

    pub fn fetch(&self, event_id: &str) -> EventContext {
        self.fetch_at(event_id, Utc::now().timestamp())
    }

    /// Context as seen at `now` (epoch seconds)
    pub fn fetch_at(&self, event_id: &str, now: i64) -> EventContext {
        let since = now - i64::from(self.lookback_days) * SECS_PER_DAY;
        match self.source.records(event_id, since) {
            Ok(records) if records.is_empty() => {
                warn!("No event records found for event_id={}", event_id);
                EventContext::empty(event_id)
            }
            Ok(records) => {
                debug!("Merging {} records for event_id={}", records.len(), event_id);
                EventContext::from_records(event_id, &records)
            }
            Err(e) => {
                warn!("Event fetch failed for event_id={}: {}", event_id, e);
                EventContext::empty(event_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_lookback_window() {
        let now = 10 * SECS_PER_DAY;
        let source = InMemoryEventSource::new(vec![
            record(json!({"gen_ai.event.id": "e1", "_time": now - 8 * SECS_PER_DAY, "gen_ai.request.model": "old"})),
            record(json!({"gen_ai.event.id": "e1", "_time": now - 60, "gen_ai.app.name": "bot"})),
        ]);
        let ctx = ContextBuilder::new(&source, 7).fetch_at("e1", now);
        assert_eq!(ctx.service_name.as_deref(), Some("bot"));
        assert!(ctx.model_name.is_none());
    }

    #[test]
    fn test_jsonl_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"gen_ai.event.id":"e1","gen_ai.pii.detected":"true"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, "[1,2]").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"event_id":"e2","gen_ai.pii.detected":"true"}}"#).unwrap();

        let records = JsonlEventSource::new(&path).records("e1", 0).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_padded_record_ids_belong() {
        let source = InMemoryEventSource::new(vec![record(json!({"event_id": " e1\t"}))]);
        assert_eq!(source.records("e1", 0).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_source_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonlEventSource::new(dir.path().join("absent.jsonl"));
        let ctx = ContextBuilder::new(&source, 7).fetch("e1");
        assert_eq!(ctx, EventContext::empty("e1"));
    }
}
