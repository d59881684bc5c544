//! Per-event case orchestration.
//!
//! Each event runs through one pass of the state machine:
//!
//! ```text
//! no event id        -> error
//! account unresolved -> error
//! mapping found      -> existing
//! lookup, unmapped   -> not_found
//! create/open        -> context -> summary -> create -> save -> created
//! ```
//!
//! The ledger lookup happens before any create call and is the only
//! idempotency guard. Failures are folded into the returned
//! [`CaseOutcome`]; nothing here aborts the caller's batch.

use crate::events::ContextBuilder;
use crate::ledger::MappingStore;
use crate::summarizer::Summarizer;
use crate::ticketing::{CaseApi, NewCase};
use caselink_shared::context::{event_id_of, first_field, RECORD_SERVICE_FIELDS};
use caselink_shared::{
    CaseError, CaseMappingRecord, CaseMode, CaseOutcome, ConfigurationError, EventContext,
    RawRecord,
};
use chrono::Utc;
use reqwest::Url;
use tracing::{debug, error, info, info_span, warn};

/// Search page and index the case description links back to
#[derive(Debug, Clone)]
pub struct EventLink {
    pub search_url: String,
    pub index: String,
}

impl EventLink {
    /// URL searching for `event_id`, query percent-encoded
    pub fn url_for(&self, event_id: &str) -> String {
        let query = format!("search index={} gen_ai.event.id={}", self.index, event_id);
        match Url::parse_with_params(&self.search_url, &[("q", query.as_str())]) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Invalid search URL '{}': {}", self.search_url, e);
                self.search_url.clone()
            }
        }
    }
}

/// Per-invocation behavior
#[derive(Debug, Clone, Copy)]
pub struct CaseOptions {
    pub mode: CaseMode,
    pub include_summary: bool,
}

impl Default for CaseOptions {
    fn default() -> Self {
        Self {
            mode: CaseMode::Create,
            include_summary: true,
        }
    }
}

/// One event as handed over by an entry point
#[derive(Debug, Clone, Default)]
pub struct EventRequest {
    pub event_id: Option<String>,
    /// Service name carried by the triggering record itself
    pub service_hint: Option<String>,
    /// Free-text description supplied by the trigger
    pub note: Option<String>,
}

impl EventRequest {
    /// Identify the event from a raw record. `override_id` wins over the
    /// record's own fields.
    pub fn from_record(record: &RawRecord, override_id: Option<&str>) -> Self {
        let event_id = override_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .or_else(|| event_id_of(record));
        Self {
            event_id,
            service_hint: first_field(record, RECORD_SERVICE_FIELDS),
            note: None,
        }
    }
}

/// `AI event <id> from <service>`, or without the service when unknown
pub fn short_description(event_id: &str, service: Option<&str>) -> String {
    match service {
        Some(service) if !service.is_empty() && service != "Unknown" => {
            format!("AI event {} from {}", event_id, service)
        }
        _ => format!("AI event {}", event_id),
    }
}

/// Case body: summary, event details and the link back to the event
pub fn case_description(
    context: &EventContext,
    service: &str,
    summary: Option<&str>,
    note: Option<&str>,
    link: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        parts.push("=== ALERT DESCRIPTION ===".to_string());
        parts.push(note.trim().to_string());
        parts.push(String::new());
    }

    parts.push("=== AI SUMMARY ===".to_string());
    parts.push(summary.unwrap_or("No summary available.").to_string());
    parts.push(String::new());

    parts.push("=== EVENT DETAILS ===".to_string());
    parts.push(format!("Event ID: {}", context.event_id));
    parts.push(format!("Service: {}", service));
    parts.push(format!("Model: {}", context.model_display()));
    parts.push(format!("Timestamp: {}", context.timestamp_display()));
    parts.push(String::new());

    parts.push("=== EVENT LINK ===".to_string());
    parts.push("View Original Event:".to_string());
    parts.push(link.to_string());

    parts.join("\n")
}

/// Runs events through the create-or-lookup protocol
pub struct CaseOrchestrator<'a> {
    api: Result<&'a dyn CaseApi, ConfigurationError>,
    store: &'a dyn MappingStore,
    contexts: ContextBuilder<'a>,
    summarizer: Summarizer<'a>,
    link: EventLink,
    options: CaseOptions,
}

impl<'a> CaseOrchestrator<'a> {
    pub fn new(
        api: Result<&'a dyn CaseApi, ConfigurationError>,
        store: &'a dyn MappingStore,
        contexts: ContextBuilder<'a>,
        summarizer: Summarizer<'a>,
        link: EventLink,
        options: CaseOptions,
    ) -> Self {
        Self {
            api,
            store,
            contexts,
            summarizer,
            link,
            options,
        }
    }

    pub fn options(&self) -> CaseOptions {
        self.options
    }

    /// Process one raw record
    pub fn process_record(&self, record: &RawRecord, override_id: Option<&str>) -> CaseOutcome {
        self.process(&EventRequest::from_record(record, override_id))
    }

    /// Process one event to a terminal outcome
    pub fn process(&self, request: &EventRequest) -> CaseOutcome {
        let event_id = match request
            .event_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(id) => id,
            None => return CaseOutcome::error("No gen_ai.event.id found in event"),
        };

        let span = info_span!("event", event_id = %event_id, mode = %self.options.mode);
        let _guard = span.enter();

        let api = match &self.api {
            Ok(api) => *api,
            Err(e) => {
                let err = CaseError::from(e.clone());
                debug!(kind = err.kind(), "Skipping event, account unresolved: {}", err);
                return CaseOutcome::error(err.to_string());
            }
        };

        let existing = match self.store.find(event_id) {
            Ok(found) => found,
            Err(e) => {
                warn!("Mapping lookup failed, treating as unmapped: {}", e);
                None
            }
        };

        if let Some(mapping) = existing {
            info!("Existing case {} found", mapping.case_sys_id);
            return CaseOutcome::existing(
                api.case_url(&mapping.instance, &mapping.case_sys_id),
                mapping.case_sys_id,
                format!("Existing case found for event_id={}", event_id),
            );
        }

        if !self.options.mode.may_create() {
            return CaseOutcome::not_found(format!("No existing case for event_id={}", event_id));
        }

        self.create(api, event_id, request)
    }

    fn create(&self, api: &dyn CaseApi, event_id: &str, request: &EventRequest) -> CaseOutcome {
        let context = self.contexts.fetch(event_id);
        let service = request
            .service_hint
            .as_deref()
            .or(context.service_name.as_deref())
            .unwrap_or("Unknown")
            .to_string();

        let summary = if self.options.include_summary {
            Some(self.summarizer.summarize(&context))
        } else {
            None
        };

        let case = NewCase {
            short_description: short_description(event_id, Some(&service)),
            description: case_description(
                &context,
                &service,
                summary.as_deref(),
                request.note.as_deref(),
                &self.link.url_for(event_id),
            ),
        };

        let created = match api.create_case(&case) {
            Ok(created) => created,
            Err(e) => {
                let err = CaseError::from(e);
                error!(kind = err.kind(), "Case creation failed: {}", err);
                return CaseOutcome::error(err.to_string());
            }
        };

        let url = api.case_url(api.instance(), &created.sys_id);
        let record = CaseMappingRecord::new(
            event_id,
            created.sys_id.clone(),
            api.instance(),
            api.username(),
            Utc::now().timestamp(),
        );

        if let Err(e) = self.store.save(&record) {
            let err = CaseError::from(e);
            error!(
                kind = err.kind(),
                "Case {} created but mapping not saved: {}", created.sys_id, err
            );
            let mut outcome = CaseOutcome::error(format!(
                "Case {} created but mapping could not be saved: {}",
                created.sys_id, err
            ))
            .with_case(url, created.sys_id);
            outcome.case_number = created.number;
            return outcome;
        }

        info!("Created case {} for event", created.sys_id);
        CaseOutcome::created(
            url,
            created.sys_id,
            created.number,
            format!("New case created for event_id={}", event_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventSource;
    use crate::ledger::Ledger;
    use crate::summarizer::FakeSummaryBackend;
    use crate::ticketing::CreatedCase;
    use caselink_shared::{ApiError, CaseStatus, StoreError};
    use serde_json::json;
    use std::cell::RefCell;

    /// Case API double recording every create call
    struct FakeCaseApi {
        result: Result<CreatedCase, ApiError>,
        created: RefCell<Vec<NewCase>>,
    }

    impl FakeCaseApi {
        fn returning(sys_id: &str) -> Self {
            Self {
                result: Ok(CreatedCase {
                    sys_id: sys_id.to_string(),
                    number: "AICASE0001".to_string(),
                }),
                created: RefCell::new(Vec::new()),
            }
        }

        fn failing(error: ApiError) -> Self {
            Self {
                result: Err(error),
                created: RefCell::new(Vec::new()),
            }
        }

        fn create_calls(&self) -> usize {
            self.created.borrow().len()
        }
    }

    impl CaseApi for FakeCaseApi {
        fn instance(&self) -> &str {
            "dev0001"
        }

        fn username(&self) -> &str {
            "svc_caselink"
        }

        fn case_url(&self, instance: &str, sys_id: &str) -> String {
            format!("https://{}.example/case/{}", instance, sys_id)
        }

        fn create_case(&self, case: &NewCase) -> Result<CreatedCase, ApiError> {
            self.created.borrow_mut().push(case.clone());
            self.result.clone()
        }
    }

    /// Store whose writes always fail
    struct ReadOnlyStore;

    impl MappingStore for ReadOnlyStore {
        fn find(&self, _event_id: &str) -> Result<Option<CaseMappingRecord>, StoreError> {
            Err(StoreError::Backend("disk I/O error".to_string()))
        }

        fn save(&self, _record: &CaseMappingRecord) -> Result<(), StoreError> {
            Err(StoreError::Backend("readonly database".to_string()))
        }

        fn update(
            &self,
            event_id: &str,
            _patch: &caselink_shared::MappingPatch,
        ) -> Result<(), StoreError> {
            Err(StoreError::NotFound(event_id.to_string()))
        }
    }

    fn link() -> EventLink {
        EventLink {
            search_url: "http://localhost:8000/en-US/app/search/search".to_string(),
            index: "gen_ai_log".to_string(),
        }
    }

    fn request(id: &str) -> EventRequest {
        EventRequest {
            event_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn run(
        api: Result<&dyn CaseApi, ConfigurationError>,
        store: &dyn MappingStore,
        mode: CaseMode,
        req: &EventRequest,
    ) -> CaseOutcome {
        let source = InMemoryEventSource::new(vec![json!({
            "gen_ai.event.id": "abc123",
            "gen_ai.app.name": "support-bot",
            "gen_ai.pii.detected": "true",
        })
        .as_object()
        .cloned()
        .unwrap()]);
        let orchestrator = CaseOrchestrator::new(
            api,
            store,
            ContextBuilder::new(&source, 7),
            Summarizer::new(None),
            link(),
            CaseOptions {
                mode,
                include_summary: true,
            },
        );
        orchestrator.process(req)
    }

    #[test]
    fn test_create_then_existing() {
        let api = FakeCaseApi::returning("xyz");
        let ledger = Ledger::open_in_memory().unwrap();

        let first = run(Ok(&api), &ledger, CaseMode::Create, &request("abc123"));
        assert_eq!(first.status, CaseStatus::Created);
        assert_eq!(first.sys_id, "xyz");
        assert!(first.url.contains("xyz"));
        assert_eq!(first.case_number, "AICASE0001");

        let second = run(Ok(&api), &ledger, CaseMode::Create, &request("abc123"));
        assert_eq!(second.status, CaseStatus::Existing);
        assert_eq!(second.sys_id, "xyz");
        assert_eq!(api.create_calls(), 1);
        assert_eq!(ledger.case_count().unwrap(), 1);
    }

    #[test]
    fn test_lookup_never_creates() {
        let api = FakeCaseApi::returning("xyz");
        let ledger = Ledger::open_in_memory().unwrap();
        let outcome = run(Ok(&api), &ledger, CaseMode::Lookup, &request("abc123"));
        assert_eq!(outcome.status, CaseStatus::NotFound);
        assert_eq!(api.create_calls(), 0);
    }

    #[test]
    fn test_open_creates_when_unmapped() {
        let api = FakeCaseApi::returning("xyz");
        let ledger = Ledger::open_in_memory().unwrap();
        let outcome = run(Ok(&api), &ledger, CaseMode::Open, &request("abc123"));
        assert_eq!(outcome.status, CaseStatus::Created);
        assert!(!outcome.url.is_empty());
    }

    #[test]
    fn test_missing_event_id() {
        let api = FakeCaseApi::returning("xyz");
        let ledger = Ledger::open_in_memory().unwrap();
        let outcome = run(Ok(&api), &ledger, CaseMode::Create, &EventRequest::default());
        assert_eq!(outcome.status, CaseStatus::Error);
        assert!(outcome.message.contains("No gen_ai.event.id"));
    }

    #[test]
    fn test_not_configured() {
        let ledger = Ledger::open_in_memory().unwrap();
        let outcome = run(
            Err(ConfigurationError::NoAccountConfigured),
            &ledger,
            CaseMode::Create,
            &request("abc123"),
        );
        assert_eq!(outcome.status, CaseStatus::Error);
        assert!(outcome.message.contains("not configured"));
    }

    #[test]
    fn test_create_failure_saves_nothing() {
        let api = FakeCaseApi::failing(ApiError::HttpStatus {
            code: 500,
            body: "boom".to_string(),
        });
        let ledger = Ledger::open_in_memory().unwrap();
        let outcome = run(Ok(&api), &ledger, CaseMode::Create, &request("abc123"));
        assert_eq!(outcome.status, CaseStatus::Error);
        assert!(outcome.message.contains("500"));
        assert!(outcome.message.contains("boom"));
        assert_eq!(ledger.case_count().unwrap(), 0);
    }

    #[test]
    fn test_save_failure_reports_orphan() {
        let api = FakeCaseApi::returning("orphan1");
        let outcome = run(Ok(&api), &ReadOnlyStore, CaseMode::Create, &request("abc123"));
        assert_eq!(outcome.status, CaseStatus::Error);
        assert_eq!(outcome.sys_id, "orphan1");
        assert!(outcome.url.contains("orphan1"));
        assert!(outcome.message.contains("mapping could not be saved"));
        // Read failure was treated as unmapped, so exactly one create happened
        assert_eq!(api.create_calls(), 1);
    }

    #[test]
    fn test_case_body_layout() {
        let api = FakeCaseApi::returning("xyz");
        let ledger = Ledger::open_in_memory().unwrap();
        run(Ok(&api), &ledger, CaseMode::Create, &request("abc123"));

        let created = api.created.borrow();
        let case = &created[0];
        assert_eq!(case.short_description, "AI event abc123 from support-bot");
        assert!(case.description.starts_with("=== AI SUMMARY ===\n"));
        assert!(case.description.contains("PII DETECTED: unknown types"));
        assert!(case.description.contains("=== EVENT DETAILS ===\nEvent ID: abc123"));
        assert!(case
            .description
            .contains("gen_ai.event.id%3Dabc123"));
    }

    #[test]
    fn test_summary_backend_output_used() {
        let backend = FakeSummaryBackend::always(
            "Risky.\nPrompt Summary: asked.\nResponse Summary: answered.",
        );
        let api = FakeCaseApi::returning("xyz");
        let ledger = Ledger::open_in_memory().unwrap();
        let source = InMemoryEventSource::new(Vec::new());
        let orchestrator = CaseOrchestrator::new(
            Ok(&api),
            &ledger,
            ContextBuilder::new(&source, 7),
            Summarizer::new(Some(&backend)),
            link(),
            CaseOptions::default(),
        );
        let record = json!({"gen_ai.event.id": "e2", "gen_ai.service.name": "hinted"});
        let outcome = orchestrator.process_record(record.as_object().unwrap(), None);
        assert_eq!(outcome.status, CaseStatus::Created);

        // No stored records: the context is empty and the backend is skipped
        assert_eq!(backend.call_count(), 0);
        let created = api.created.borrow();
        assert_eq!(created[0].short_description, "AI event e2 from hinted");
        assert!(created[0].description.contains("No event details available"));
    }

    #[test]
    fn test_event_link_encoding() {
        let url = link().url_for("a b");
        assert!(url.starts_with("http://localhost:8000/en-US/app/search/search?q="));
        assert!(url.contains("index%3Dgen_ai_log"));
        assert!(!url.contains(' '));
    }

    #[test]
    fn test_record_hint_prefers_service_name() {
        let record = json!({
            "gen_ai.event.id": " abc123 ",
            "gen_ai.app.name": "app",
            "gen_ai.service.name": "svc",
        });
        let req = EventRequest::from_record(record.as_object().unwrap(), None);
        assert_eq!(req.event_id.as_deref(), Some("abc123"));
        assert_eq!(req.service_hint.as_deref(), Some("svc"));

        let req = EventRequest::from_record(record.as_object().unwrap(), Some("  "));
        assert_eq!(req.event_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_padded_id_finds_context() {
        let api = FakeCaseApi::returning("xyz");
        let ledger = Ledger::open_in_memory().unwrap();
        let outcome = run(Ok(&api), &ledger, CaseMode::Create, &request("  abc123 "));
        assert_eq!(outcome.status, CaseStatus::Created);
        assert!(ledger.find("abc123").unwrap().is_some());
        let body = &api.created.borrow()[0].description;
        assert!(body.contains("PII DETECTED"));
    }

    #[test]
    fn test_short_description_without_service() {
        assert_eq!(short_description("e1", None), "AI event e1");
        assert_eq!(short_description("e1", Some("Unknown")), "AI event e1");
    }
}
