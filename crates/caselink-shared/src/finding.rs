//! Anomaly findings attached to an observability event.
//!
//! Detection order is fixed and is the order labels appear in case
//! descriptions and fallback summaries.

use serde::{Deserialize, Serialize};

/// One detected anomaly category with its optional detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Pii { types: Option<String> },
    SafetyViolation { category: Option<String> },
    PolicyBlock { policy: Option<String> },
    PromptAnomaly { score: Option<String> },
    ResponseAnomaly { score: Option<String> },
    HighRisk { level: Option<String> },
    GuardrailTrigger { guardrail: Option<String> },
}

impl Finding {
    /// Human-readable label used in summaries and case bodies
    pub fn label(&self) -> String {
        fn or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
            value.as_deref().unwrap_or(default)
        }

        match self {
            Self::Pii { types } => format!("PII DETECTED: {}", or(types, "unknown types")),
            Self::SafetyViolation { category } => {
                format!("SAFETY VIOLATION: {}", or(category, "unspecified"))
            }
            Self::PolicyBlock { policy } => {
                format!("POLICY BLOCKED: {}", or(policy, "unspecified policy"))
            }
            Self::PromptAnomaly { score } => {
                format!("PROMPT ANOMALY DETECTED (score: {})", or(score, "N/A"))
            }
            Self::ResponseAnomaly { score } => {
                format!("RESPONSE ANOMALY DETECTED (score: {})", or(score, "N/A"))
            }
            Self::HighRisk { level } => format!("HIGH RISK LEVEL: {}", or(level, "HIGH")),
            Self::GuardrailTrigger { guardrail } => {
                format!("GUARDRAIL TRIGGERED: {}", or(guardrail, "unspecified"))
            }
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}
