//! Error taxonomy for case creation.
//!
//! Each external collaborator reports failures through its own enum. None of
//! them abort a batch: the orchestrator folds them into a per-event `error`
//! outcome, and summarization failures never leave the summarizer at all.

use thiserror::Error;

/// Account configuration could not be resolved into usable credentials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Ticketing account not configured. Add an account stanza to the credentials file.")]
    NoAccountConfigured,

    #[error("Basic auth credentials incomplete for account '{account}' (missing {missing})")]
    IncompleteBasicAuth { account: String, missing: String },

    #[error("OAuth credentials incomplete for account '{account}' (missing {missing})")]
    IncompleteOAuthAuth { account: String, missing: String },

    #[error("Secret lookup failed: {0}")]
    SecretLookupFailed(String),
}

/// Token acquisition failed. Fatal for the current event only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("OAuth token error {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("OAuth connection error: {reason}")]
    Transport { reason: String },

    #[error("OAuth token request timed out after {0} seconds")]
    Timeout(u64),

    #[error("OAuth token response invalid: {reason}")]
    InvalidResponse { reason: String },
}

/// A ticketing REST call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Non-2xx answer. `body` is the server payload, verbatim.
    #[error("Ticketing API error {code}: {body}")]
    HttpStatus { code: u16, body: String },

    #[error("Ticketing connection error: {reason}")]
    Transport { reason: String },

    #[error("Ticketing request timed out after {0} seconds")]
    Timeout(u64),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Ticketing API returned an unusable response: {reason}")]
    InvalidResponse { reason: String },
}

/// Mapping ledger read or write failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The unique key already has a record. Raised when two runs race on
    /// the same event identifier.
    #[error("Mapping already exists for key '{0}'")]
    Duplicate(String),

    #[error("No mapping found for key '{0}'")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Backend(String),
}

/// The AI summary could not be produced. Always downgraded to the
/// structured fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummarizationError {
    #[error("Summarization capability not installed or unreachable: {0}")]
    Unavailable(String),

    #[error("Summarization permission denied: {0}")]
    PermissionDenied(String),

    #[error("Summarization timed out after {0} seconds")]
    Timeout(u64),

    #[error("Summarization request failed: {0}")]
    Backend(String),

    #[error("Summarization returned empty output")]
    Empty,

    #[error("Summarization output malformed: {0}")]
    Malformed(String),
}

/// The raw event records could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventSourceError {
    #[error("Event source unavailable: {0}")]
    Unavailable(String),
}

/// Any failure that decides a per-event `error` outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CaseError {
    /// Stable short name of the failure class, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CaseError::Configuration(_) => "configuration",
            CaseError::Api(ApiError::Auth(_)) => "auth",
            CaseError::Api(_) => "api",
            CaseError::Store(_) => "store",
        }
    }
}
