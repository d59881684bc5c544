//! Case summary generation.
//!
//! The AI backend is tried first with a fixed audit-style instruction. Any
//! failure there (not installed, error, timeout, empty or malformed output)
//! drops to a deterministic summary built from the detected findings, so
//! [`Summarizer::summarize`] always returns text.

use crate::config::SummaryConfig;
use caselink_shared::escape::escape_template_text;
use caselink_shared::{EventContext, SummarizationError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Marker the AI output must contain for the user prompt part
pub const PROMPT_MARKER: &str = "Prompt Summary";

/// Marker the AI output must contain for the model response part
pub const RESPONSE_MARKER: &str = "Response Summary";

/// Prompt/response previews in the fallback are cut to this many characters
pub const PREVIEW_CHARS: usize = 100;

const INSTRUCTION: &str = "CONTEXT: You are a security/compliance analyst reviewing GenAI \
application telemetry logs for a ticketing case. This is audit work, not a request for \
advice. TASK: Analyze this LOG ENTRY and provide: \
1. A concise 2-3 sentence summary highlighting key anomalies and concerns. \
2. A brief 1-sentence summary of what the end user asked (Prompt Summary). \
3. A brief 1-sentence summary of the AI system response (Response Summary). \
Note any PII, PHI or policy concerns found in the log data. \
Format your response EXACTLY as: [Summary] then Prompt Summary: [text] then Response Summary: [text]";

/// Text generation capability
pub trait SummaryBackend {
    fn generate(&self, prompt: &str) -> Result<String, SummarizationError>;
}

/// Summary backend over an Ollama or OpenAI-compatible endpoint
pub struct HttpSummaryBackend {
    config: SummaryConfig,
    client: reqwest::blocking::Client,
}

impl HttpSummaryBackend {
    pub fn new(config: SummaryConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { config, client })
    }

    /// Check if endpoint is Ollama-style
    fn is_ollama_endpoint(&self) -> bool {
        self.config.endpoint.contains("11434") || self.config.endpoint.contains("ollama")
    }

    fn send(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value, SummarizationError> {
        let mut request = self.client.post(url).json(body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                SummarizationError::Timeout(self.config.timeout_secs)
            } else if e.is_connect() {
                SummarizationError::Unavailable(e.to_string())
            } else {
                SummarizationError::Backend(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SummarizationError::PermissionDenied(format!("HTTP {}", status)));
        }
        if status.as_u16() == 404 {
            return Err(SummarizationError::Unavailable(format!("HTTP {} from {}", status, url)));
        }
        if !status.is_success() {
            return Err(SummarizationError::Backend(format!("HTTP {}", status)));
        }

        response
            .json()
            .map_err(|e| SummarizationError::Backend(format!("Failed to parse response: {}", e)))
    }

    fn call_ollama(&self, prompt: &str) -> Result<String, SummarizationError> {
        let url = format!("{}/api/generate", self.config.endpoint);
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });

        let json = self.send(&url, &body)?;
        Ok(json
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    fn call_openai_compatible(&self, prompt: &str) -> Result<String, SummarizationError> {
        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "user", "content": prompt},
            ],
        });

        let json = self.send(&url, &body)?;
        Ok(json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

impl SummaryBackend for HttpSummaryBackend {
    fn generate(&self, prompt: &str) -> Result<String, SummarizationError> {
        if self.is_ollama_endpoint() {
            self.call_ollama(prompt)
        } else {
            self.call_openai_compatible(prompt)
        }
    }
}

/// Fake backend for testing
pub struct FakeSummaryBackend {
    responses: std::sync::Mutex<Vec<Result<String, SummarizationError>>>,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl FakeSummaryBackend {
    /// Create a fake backend with pre-defined responses. The last one repeats.
    pub fn new(responses: Vec<Result<String, SummarizationError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn always_error(error: SummarizationError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl SummaryBackend for FakeSummaryBackend {
    fn generate(&self, prompt: &str) -> Result<String, SummarizationError> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());

        let mut responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        match responses.len() {
            0 => Err(SummarizationError::Empty),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

/// Full instruction for `context`, with the event data escaped into a
/// quoted block.
pub fn build_prompt(context: &EventContext) -> String {
    format!(
        "{} LOG DATA: \"{}\"",
        INSTRUCTION,
        escape_template_text(&context.render())
    )
}

/// Accept backend output only when it is non-empty and has both parts
pub fn validate_summary(text: &str) -> Result<String, SummarizationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SummarizationError::Empty);
    }
    for marker in [PROMPT_MARKER, RESPONSE_MARKER] {
        if !text.contains(marker) {
            return Err(SummarizationError::Malformed(format!("missing '{}'", marker)));
        }
    }
    Ok(text.to_string())
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let kept: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

/// Deterministic summary from the context alone
pub fn fallback_summary(context: &EventContext) -> String {
    if !context.has_details() {
        return "Unable to generate summary: No event details available.".to_string();
    }

    let service = context.service_display();
    let model = context.model_display();
    let main = if context.findings.is_empty() {
        format!(
            "This GenAI event from {} ({}) completed and no anomalies were detected. \
             Created for tracking purposes.",
            service, model
        )
    } else {
        format!(
            "This GenAI event from {} ({}) has the following concerns: {}. \
             Recommend review by security/compliance team.",
            service,
            model,
            context.finding_labels().join("; ")
        )
    };

    let prompt = match &context.prompt_text {
        Some(text) => format!("{}: {}", PROMPT_MARKER, preview(text)),
        None => format!("{}: User interaction recorded (AI summary unavailable)", PROMPT_MARKER),
    };
    let response = match &context.response_text {
        Some(text) => format!("{}: {}", RESPONSE_MARKER, preview(text)),
        None => format!("{}: AI response recorded (AI summary unavailable)", RESPONSE_MARKER),
    };

    format!("{}\n\n{}\n{}", main, prompt, response)
}

/// Summary producer. Without a backend only the fallback runs.
pub struct Summarizer<'a> {
    backend: Option<&'a dyn SummaryBackend>,
}

impl<'a> Summarizer<'a> {
    pub fn new(backend: Option<&'a dyn SummaryBackend>) -> Self {
        Self { backend }
    }

    /// Backend output, validated
    pub fn try_ai(&self, context: &EventContext) -> Result<String, SummarizationError> {
        let backend = self.backend.ok_or_else(|| {
            SummarizationError::Unavailable("no summary backend configured".to_string())
        })?;
        let output = backend.generate(&build_prompt(context))?;
        validate_summary(&output)
    }

    /// Always non-empty
    pub fn summarize(&self, context: &EventContext) -> String {
        if !context.has_details() {
            return fallback_summary(context);
        }

        match self.try_ai(context) {
            Ok(summary) => {
                info!("Generated AI summary for event_id={}", context.event_id);
                summary
            }
            Err(SummarizationError::Unavailable(reason)) if self.backend.is_none() => {
                debug!("AI summary skipped: {}", reason);
                fallback_summary(context)
            }
            Err(e) => {
                warn!(
                    "AI summary failed for event_id={}, using fallback: {}",
                    context.event_id, e
                );
                fallback_summary(context)
            }
        }
    }
}
