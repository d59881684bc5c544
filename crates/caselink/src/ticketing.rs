//! Ticketing REST client.
//!
//! Every call is authenticated through the [`TokenManager`], sends and
//! accepts JSON and is attempted exactly once. Failures are translated into
//! [`ApiError`] with the server body kept verbatim.

use crate::config::TicketingConfig;
use crate::token::TokenManager;
use caselink_shared::account::HOSTED_DOMAIN;
use caselink_shared::{ApiError, ResolvedAccount, CASE_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Record limit of the unfiltered asset fetch
pub const ASSET_SCAN_LIMIT: usize = 1000;

/// Separator between encoded-query terms; names containing it never reach
/// the filtered query
const QUERY_OPERATOR: char = '^';

/// Fields of a case to be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCase {
    pub short_description: String,
    pub description: String,
}

/// Identity of a case the server just created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCase {
    pub sys_id: String,
    /// `number` when the table has one, else the short description
    pub number: String,
}

/// Case operations the orchestrator depends on
pub trait CaseApi {
    /// Instance recorded in mappings created through this client
    fn instance(&self) -> &str;

    /// Account user recorded as mapping creator
    fn username(&self) -> &str;

    /// Browser URL of a case living on `instance`
    fn case_url(&self, instance: &str, sys_id: &str) -> String;

    fn create_case(&self, case: &NewCase) -> Result<CreatedCase, ApiError>;
}

/// A digital asset record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetRecord {
    pub sys_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub name: String,
}

/// Asset lookup used by the asset sync workflow
pub trait AssetLookup {
    fn find_asset(&self, app_name: &str) -> Result<Option<AssetRecord>, ApiError>;
}

/// Authenticated client for one resolved account
pub struct TicketingClient {
    account: ResolvedAccount,
    tokens: TokenManager,
    http: reqwest::blocking::Client,
    settings: TicketingConfig,
}

impl TicketingClient {
    pub fn new(account: ResolvedAccount, settings: TicketingConfig) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        let tokens = TokenManager::new(settings.timeout_secs)?;

        Ok(Self {
            account,
            tokens,
            http,
            settings,
        })
    }

    pub fn account(&self) -> &ResolvedAccount {
        &self.account
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Authenticated JSON request against `path` under the account base URL.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let authorization = self.tokens.authorization(&self.account)?;
        let url = format!("{}{}", self.account.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", authorization)
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.settings.timeout_secs)
            } else {
                ApiError::Transport {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().map_err(|e| ApiError::Transport {
            reason: format!("Failed to read response: {}", e),
        })?;

        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                code: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse {
            reason: format!("body is not JSON: {}", e),
        })
    }

    fn table_path(table: &str) -> String {
        format!("/api/now/table/{}", table)
    }

    /// `result` array of a table query
    fn result_rows(value: Value) -> Result<Vec<AssetRecord>, ApiError> {
        let rows = match value.get("result") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => {
                return Err(ApiError::InvalidResponse {
                    reason: "missing result array".to_string(),
                })
            }
        };
        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<AssetRecord>(row).ok())
            .collect())
    }

    fn query_asset_filtered(&self, app_name: &str) -> Result<Vec<AssetRecord>, ApiError> {
        let query = [
            ("sysparm_query", format!("display_name={}", app_name)),
            ("sysparm_limit", "1".to_string()),
            ("sysparm_fields", "sys_id,display_name".to_string()),
        ];
        let value = self.request(
            Method::GET,
            &Self::table_path(&self.settings.asset_table),
            &query,
            None,
        )?;
        Self::result_rows(value)
    }

    fn scan_assets(&self) -> Result<Vec<AssetRecord>, ApiError> {
        let query = [
            ("sysparm_limit", ASSET_SCAN_LIMIT.to_string()),
            ("sysparm_fields", "sys_id,display_name,name".to_string()),
        ];
        let value = self.request(
            Method::GET,
            &Self::table_path(&self.settings.asset_table),
            &query,
            None,
        )?;
        Self::result_rows(value)
    }
}

/// Case-insensitive, trimmed match on `display_name`, then `name`
pub fn match_asset(records: Vec<AssetRecord>, app_name: &str) -> Option<AssetRecord> {
    let wanted = app_name.trim().to_lowercase();
    let matches = |field: &str| field.trim().to_lowercase() == wanted;

    if let Some(pos) = records.iter().position(|r| matches(&r.display_name)) {
        return records.into_iter().nth(pos);
    }
    records.into_iter().find(|r| matches(&r.name))
}

impl CaseApi for TicketingClient {
    fn instance(&self) -> &str {
        &self.account.instance
    }

    fn username(&self) -> &str {
        &self.account.username
    }

    fn case_url(&self, instance: &str, sys_id: &str) -> String {
        let base = if instance == self.account.instance {
            self.account.base_url.clone()
        } else {
            format!("https://{}{}", instance, HOSTED_DOMAIN)
        };
        format!(
            "{}/now/ai-control-tower/record/{}/{}",
            base, self.settings.case_table, sys_id
        )
    }

    fn create_case(&self, case: &NewCase) -> Result<CreatedCase, ApiError> {
        let body = serde_json::json!({
            "short_description": case.short_description,
            "type": CASE_TYPE,
            "description": case.description,
            "u_source": self.settings.source_label,
        });

        let value = self.request(
            Method::POST,
            &Self::table_path(&self.settings.case_table),
            &[],
            Some(&body),
        )?;

        let result = value.get("result").ok_or_else(|| ApiError::InvalidResponse {
            reason: "create response has no result".to_string(),
        })?;
        let sys_id = result
            .get("sys_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse {
                reason: "created record has no sys_id".to_string(),
            })?;
        let number = result
            .get("number")
            .and_then(Value::as_str)
            .or_else(|| result.get("short_description").and_then(Value::as_str))
            .unwrap_or_default();

        info!("Created case {} ({})", sys_id, number);
        Ok(CreatedCase {
            sys_id: sys_id.to_string(),
            number: number.to_string(),
        })
    }
}

impl AssetLookup for TicketingClient {
    /// Filtered query first. Its rows are matched locally like the scan's;
    /// an error or no match falls back to a bounded unfiltered scan.
    fn find_asset(&self, app_name: &str) -> Result<Option<AssetRecord>, ApiError> {
        if app_name.contains(QUERY_OPERATOR) {
            debug!("'{}' contains an encoded-query operator, scanning", app_name);
        } else {
            match self.query_asset_filtered(app_name) {
                Ok(rows) => match match_asset(rows, app_name) {
                    Some(asset) => return Ok(Some(asset)),
                    None => debug!("Filtered asset query had no match for '{}', scanning", app_name),
                },
                Err(e) => warn!("Filtered asset query failed for '{}': {}, scanning", app_name, e),
            }
        }

        let rows = self.scan_assets()?;
        debug!("Scanned {} asset records", rows.len());
        Ok(match_asset(rows, app_name))
    }
}
