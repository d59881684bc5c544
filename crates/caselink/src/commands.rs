//! Entry points: streaming command, alert action and asset sync.
//!
//! All three read from an input stream and write JSON to an output stream.
//! A stream line that is not a JSON object becomes an `error` record of its
//! own and the batch continues. An unparsable alert or sync payload is fatal
//! for the invocation.

use crate::app::App;
use crate::asset_sync::{app_name_of, AssetSyncResult, SyncSummary};
use crate::orchestrator::{CaseOptions, EventRequest};
use anyhow::{bail, Context, Result};
use caselink_shared::{CaseMode, CaseOutcome, RawRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};

/// Output fields added to each streamed record
pub const FIELD_URL: &str = "case_url";
pub const FIELD_SYS_ID: &str = "case_sys_id";
pub const FIELD_NUMBER: &str = "case_number";
pub const FIELD_STATUS: &str = "case_status";
pub const FIELD_MESSAGE: &str = "case_message";

/// Copy `outcome` into `record` under the stream output fields
pub fn annotate(record: &mut RawRecord, outcome: &CaseOutcome) {
    record.insert(FIELD_URL.to_string(), Value::from(outcome.url.clone()));
    record.insert(FIELD_SYS_ID.to_string(), Value::from(outcome.sys_id.clone()));
    record.insert(FIELD_NUMBER.to_string(), Value::from(outcome.case_number.clone()));
    record.insert(FIELD_STATUS.to_string(), Value::from(outcome.status.to_string()));
    record.insert(FIELD_MESSAGE.to_string(), Value::from(outcome.message.clone()));
}

/// Per-status counts of one stream run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub records: usize,
    pub created: usize,
    pub existing: usize,
    pub not_found: usize,
    pub errors: usize,
}

impl StreamStats {
    fn record(&mut self, outcome: &CaseOutcome) {
        use caselink_shared::CaseStatus::*;
        self.records += 1;
        match outcome.status {
            Created => self.created += 1,
            Existing => self.existing += 1,
            NotFound => self.not_found += 1,
            Error => self.errors += 1,
        }
    }
}

fn rejected_line(message: String) -> CaseOutcome {
    warn!("{}", message);
    CaseOutcome::error(message)
}

/// Streaming command: one JSON object per input line, each written back
/// with the case fields added.
pub fn run_stream<R: BufRead, W: Write>(
    app: &App,
    options: CaseOptions,
    event_id: Option<&str>,
    input: R,
    mut output: W,
) -> Result<StreamStats> {
    let orchestrator = app.orchestrator(options);
    let mut stats = StreamStats::default();

    for (n, line) in input.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let (mut record, outcome) = match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(record)) => {
                let outcome = orchestrator.process_record(&record, event_id);
                (record, outcome)
            }
            Ok(_) => (
                RawRecord::new(),
                rejected_line(format!("Input line {} is not a JSON object", n + 1)),
            ),
            Err(e) => (
                RawRecord::new(),
                rejected_line(format!("Invalid JSON on input line {}: {}", n + 1, e)),
            ),
        };

        stats.record(&outcome);
        annotate(&mut record, &outcome);
        writeln!(output, "{}", serde_json::to_string(&record)?)?;
    }

    output.flush()?;
    info!(
        "Stream complete: records={}, created={}, existing={}, not_found={}, errors={}",
        stats.records, stats.created, stats.existing, stats.not_found, stats.errors
    );
    Ok(stats)
}

/// Alert action settings
#[derive(Debug, Default, Deserialize)]
pub struct AlertConfiguration {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub case_description: Option<String>,
    /// Boolean or a "true"/"false" style string
    #[serde(default)]
    pub include_summary: Option<Value>,
}

/// Alert action input
#[derive(Debug, Default, Deserialize)]
pub struct AlertPayload {
    #[serde(default)]
    pub configuration: AlertConfiguration,
    /// Triggering result row
    #[serde(default)]
    pub result: RawRecord,
}

/// Alert action output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertResponse {
    pub success: bool,
    pub status: String,
    pub message: String,
    pub case_url: String,
    pub sys_id: String,
    pub case_number: String,
}

impl From<CaseOutcome> for AlertResponse {
    fn from(outcome: CaseOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            status: outcome.status.to_string(),
            message: outcome.message,
            case_url: outcome.url,
            sys_id: outcome.sys_id,
            case_number: outcome.case_number,
        }
    }
}

/// Lenient flag parsing for string-typed settings
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "t" | "y" => Some(true),
            "false" | "0" | "no" | "f" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

impl AlertPayload {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            bail!("No input payload provided");
        }
        serde_json::from_str(text).context("Invalid alert payload")
    }

    /// Event to process, the configured id winning over the result row
    pub fn request(&self) -> EventRequest {
        let mut request = EventRequest::from_record(&self.result, None);
        if let Some(id) = self
            .configuration
            .event_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            request.event_id = Some(id.to_string());
        }
        request.note = self.configuration.case_description.clone();
        request
    }

    /// Alerts create without an AI summary unless asked
    pub fn options(&self) -> CaseOptions {
        CaseOptions {
            mode: CaseMode::Create,
            include_summary: self
                .configuration
                .include_summary
                .as_ref()
                .and_then(parse_flag)
                .unwrap_or(false),
        }
    }
}

/// Alert action: one payload in, one JSON result out
pub fn run_alert<R: Read, W: Write>(app: &App, mut input: R, mut output: W) -> Result<AlertResponse> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .context("Failed to read alert payload")?;
    let payload = AlertPayload::parse(&text)?;

    let outcome = app.orchestrator(payload.options()).process(&payload.request());
    let response = AlertResponse::from(outcome);
    writeln!(output, "{}", serde_json::to_string(&response)?)?;
    output.flush()?;
    Ok(response)
}

/// Asset sync input
#[derive(Debug, Default, Deserialize)]
pub struct SyncPayload {
    #[serde(default)]
    pub result: RawRecord,
    /// JSON-lines file with one result row per line
    #[serde(default)]
    pub results_file: Option<PathBuf>,
}

impl SyncPayload {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            bail!("No input payload provided");
        }
        serde_json::from_str(text).context("Invalid sync payload")
    }

    /// App names from the result row, then from the results file. An
    /// unreadable file is logged and skipped.
    pub fn app_names(&self) -> Vec<String> {
        let mut names: Vec<String> = app_name_of(&self.result).into_iter().collect();

        let Some(path) = &self.results_file else {
            return names;
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Results file {} unreadable: {}", path.display(), e);
                return names;
            }
        };

        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Stopped reading {} at line {}: {}", path.display(), n + 1, e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(row)) => names.extend(app_name_of(&row)),
                _ => warn!("Skipping malformed results line {}", n + 1),
            }
        }
        names
    }
}

/// Asset sync output
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub summary: SyncSummary,
    pub results: Vec<AssetSyncResult>,
}

/// Asset sync: every app name in the payload is looked up and mapped
pub fn run_sync_assets<R: Read, W: Write>(app: &App, mut input: R, mut output: W) -> Result<SyncReport> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .context("Failed to read sync payload")?;
    let payload = SyncPayload::parse(&text)?;

    let report = match app.asset_sync() {
        Err(e) => SyncReport {
            success: false,
            message: e.to_string(),
            summary: SyncSummary::default(),
            results: Vec::new(),
        },
        Ok(sync) => {
            let mut summary = SyncSummary::default();
            let mut results = Vec::new();
            for name in payload.app_names() {
                let result = sync.sync(&name);
                summary.record(&result);
                results.push(result);
            }
            info!(
                "Sync complete: processed={}, success={}, errors={}",
                summary.processed, summary.succeeded, summary.errors
            );
            SyncReport {
                success: !summary.failed(),
                message: format!(
                    "Processed {} app names: {} succeeded, {} failed",
                    summary.processed, summary.succeeded, summary.errors
                ),
                summary,
                results,
            }
        }
    };

    writeln!(output, "{}", serde_json::to_string(&report)?)?;
    output.flush()?;
    Ok(report)
}
