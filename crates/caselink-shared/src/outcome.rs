//! Per-event result shape shared by every entry point.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How an invocation treats events that have no case yet.
/// Resolved once per invocation, never per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// Create a case when none is mapped
    #[default]
    Create,
    /// Report mapping state only, never create
    Lookup,
    /// Return the case URL, creating the case first if needed
    Open,
}

impl CaseMode {
    /// Whether a missing mapping may lead to a create call
    pub fn may_create(&self) -> bool {
        !matches!(self, Self::Lookup)
    }
}

impl std::fmt::Display for CaseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Lookup => write!(f, "lookup"),
            Self::Open => write!(f, "open"),
        }
    }
}

impl FromStr for CaseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "lookup" => Ok(Self::Lookup),
            "open" => Ok(Self::Open),
            other => Err(format!(
                "invalid mode '{}': expected create, lookup or open",
                other
            )),
        }
    }
}

/// Terminal state of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Created,
    Existing,
    NotFound,
    Error,
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Existing => write!(f, "existing"),
            Self::NotFound => write!(f, "not_found"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Uniform result for every terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub url: String,
    pub sys_id: String,
    pub case_number: String,
    pub status: CaseStatus,
    pub message: String,
}

impl CaseOutcome {
    pub fn created(
        url: impl Into<String>,
        sys_id: impl Into<String>,
        case_number: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            sys_id: sys_id.into(),
            case_number: case_number.into(),
            status: CaseStatus::Created,
            message: message.into(),
        }
    }

    pub fn existing(
        url: impl Into<String>,
        sys_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            sys_id: sys_id.into(),
            case_number: String::new(),
            status: CaseStatus::Existing,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            url: String::new(),
            sys_id: String::new(),
            case_number: String::new(),
            status: CaseStatus::NotFound,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            url: String::new(),
            sys_id: String::new(),
            case_number: String::new(),
            status: CaseStatus::Error,
            message: message.into(),
        }
    }

    /// Attach the remote identity of a case that exists but failed a later
    /// step (an unmapped orphan).
    pub fn with_case(mut self, url: impl Into<String>, sys_id: impl Into<String>) -> Self {
        self.url = url.into();
        self.sys_id = sys_id.into();
        self
    }

    /// `created` and `existing` both mean a case is linked
    pub fn is_success(&self) -> bool {
        matches!(self.status, CaseStatus::Created | CaseStatus::Existing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("create".parse::<CaseMode>(), Ok(CaseMode::Create));
        assert_eq!(" LOOKUP ".parse::<CaseMode>(), Ok(CaseMode::Lookup));
        assert_eq!("open".parse::<CaseMode>(), Ok(CaseMode::Open));
        assert!("delete".parse::<CaseMode>().is_err());
    }

    #[test]
    fn test_only_lookup_never_creates() {
        assert!(CaseMode::Create.may_create());
        assert!(CaseMode::Open.may_create());
        assert!(!CaseMode::Lookup.may_create());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let outcome = CaseOutcome::not_found("nothing mapped");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(CaseStatus::NotFound.to_string(), "not_found");
    }

    #[test]
    fn test_success_classification() {
        assert!(CaseOutcome::created("u", "s", "n", "m").is_success());
        assert!(CaseOutcome::existing("u", "s", "m").is_success());
        assert!(!CaseOutcome::not_found("m").is_success());
        assert!(!CaseOutcome::error("m").with_case("u", "s").is_success());
    }
}
