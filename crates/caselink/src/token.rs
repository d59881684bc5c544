//! Authorization headers for ticketing calls.
//!
//! Basic accounts get a header computed locally. OAuth accounts get a bearer
//! token from the password grant, cached in memory for the invocation and
//! refreshed shortly before it expires.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use caselink_shared::{AuthError, Credentials, ResolvedAccount};
use chrono::Utc;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Token endpoint, relative to the account base URL
pub const TOKEN_PATH: &str = "/oauth_token.do";

/// A token this close to expiry is treated as expired
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

/// Lifetime assumed when the token response omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 1800;

/// Cached bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub account_name: String,
    pub access_token: String,
    /// Epoch seconds
    pub expires_at: i64,
}

impl Token {
    pub fn is_fresh(&self, now: i64) -> bool {
        now < self.expires_at - TOKEN_EXPIRY_SKEW_SECS
    }
}

/// `Basic base64(username:password)`
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

/// Produces `Authorization` header values for one invocation
pub struct TokenManager {
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    cache: Mutex<Option<Token>>,
}

impl TokenManager {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            timeout_secs,
            cache: Mutex::new(None),
        })
    }

    /// Header value for `account`, fetching a token if needed
    pub fn authorization(&self, account: &ResolvedAccount) -> Result<String, AuthError> {
        self.authorization_at(account, Utc::now().timestamp())
    }

    /// Same as [`authorization`](Self::authorization) with an explicit clock
    pub fn authorization_at(
        &self,
        account: &ResolvedAccount,
        now: i64,
    ) -> Result<String, AuthError> {
        match &account.credentials {
            Credentials::Basic { password } => Ok(basic_header(&account.username, password)),
            Credentials::OAuth {
                client_id,
                client_secret,
                password,
            } => {
                let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(token) = cache.as_ref() {
                    if token.account_name == account.account_name && token.is_fresh(now) {
                        debug!("Reusing cached OAuth token (expires at {})", token.expires_at);
                        return Ok(format!("Bearer {}", token.access_token));
                    }
                }

                let token = self.fetch_token(
                    account,
                    client_id,
                    client_secret,
                    password.as_deref().unwrap_or(""),
                    now,
                )?;
                let header = format!("Bearer {}", token.access_token);
                *cache = Some(token);
                Ok(header)
            }
        }
    }

    /// Currently cached token, if any
    pub fn cached(&self) -> Option<Token> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// One password-grant request, no retry
    fn fetch_token(
        &self,
        account: &ResolvedAccount,
        client_id: &str,
        client_secret: &str,
        password: &str,
        now: i64,
    ) -> Result<Token, AuthError> {
        let url = format!("{}{}", account.base_url, TOKEN_PATH);
        info!("Requesting OAuth token for account '{}'", account.account_name);

        let form = [
            ("grant_type", "password"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("username", account.username.as_str()),
            ("password", password),
        ];

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout(self.timeout_secs)
                } else {
                    AuthError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| AuthError::Transport {
            reason: format!("Failed to read token response: {}", e),
        })?;

        if !status.is_success() {
            warn!("OAuth token request rejected with HTTP {}", status.as_u16());
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(&account.account_name, &body, now)
    }
}

/// Token from a successful token endpoint body
pub fn parse_token_response(account_name: &str, body: &str, now: i64) -> Result<Token, AuthError> {
    let json: Value = serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse {
        reason: format!("not JSON: {}", e),
    })?;

    let access_token = json
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidResponse {
            reason: "missing access_token".to_string(),
        })?;

    let expires_in = match json.get("expires_in") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Ok(Token {
        account_name: account_name.to_string(),
        access_token: access_token.to_string(),
        expires_at: now + expires_in,
    })
}
