//! Ticketing account resolution.
//!
//! A credential store holds account stanzas and secret entries. Resolution
//! picks one account, attaches its secrets by realm and refuses to hand out
//! anything incomplete. No network is touched here.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Realm prefix under which an account's secrets are stored
pub const REALM_PREFIX: &str = "caselink_account__";

/// Hosted instances live under this domain
pub const HOSTED_DOMAIN: &str = ".service-now.com";

/// Realm holding the secrets of `account_name`
pub fn realm_for(account_name: &str) -> String {
    format!("{}{}", REALM_PREFIX, account_name)
}

/// Authentication scheme of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthType {
    #[default]
    Basic,
    OAuthCode,
    OAuthClient,
}

impl AuthType {
    pub fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuthCode | Self::OAuthClient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::OAuthCode => "oauth_code",
            Self::OAuthClient => "oauth_client",
        }
    }
}

/// Unknown schemes are treated as basic auth
impl From<String> for AuthType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "oauth_code" | "oauth_auth_code" => Self::OAuthCode,
            "oauth_client" | "oauth_client_creds" => Self::OAuthClient,
            _ => Self::Basic,
        }
    }
}

impl From<AuthType> for String {
    fn from(value: AuthType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One account stanza as written in the credential store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountStanza {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub client_id: String,
}

impl AccountStanza {
    /// `default` and `_`-prefixed stanzas carry shared settings, not accounts
    pub fn is_reserved(&self) -> bool {
        self.name == "default" || self.name.starts_with('_')
    }
}

/// One stored secret
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecretEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub realm: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub clear_password: String,
}

impl SecretEntry {
    /// Logical secret name: the segment after the first `:` of the entry
    /// name when there is one, else the entry's username.
    pub fn secret_name(&self) -> &str {
        match self.name.split(':').nth(1) {
            Some(segment) if self.name.contains(':') => segment,
            _ => &self.username,
        }
    }

    fn names(&self, needle: &str) -> bool {
        self.secret_name() == needle || self.name.contains(needle)
    }
}

impl std::fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretEntry")
            .field("name", &self.name)
            .field("realm", &self.realm)
            .field("username", &self.username)
            .field("clear_password", &"<redacted>")
            .finish()
    }
}

/// Secret material of a resolved account
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic {
        password: String,
    },
    OAuth {
        client_id: String,
        client_secret: String,
        /// Required by the password grant; absent means the token request
        /// goes out without one and the server decides.
        password: Option<String>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { .. } => f.debug_struct("Basic").finish_non_exhaustive(),
            Self::OAuth { client_id, .. } => f
                .debug_struct("OAuth")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Complete, validated account ready for network use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub account_name: String,
    pub instance: String,
    /// Scheme and host, no trailing slash
    pub base_url: String,
    pub username: String,
    pub credentials: Credentials,
}

impl ResolvedAccount {
    pub fn auth_label(&self) -> &'static str {
        match self.credentials {
            Credentials::Basic { .. } => "basic",
            Credentials::OAuth { .. } => "oauth",
        }
    }
}

/// Instance name from an account URL: scheme, hosted domain and slashes
/// removed.
pub fn instance_from_url(url: &str) -> String {
    url.trim()
        .replace("https://", "")
        .replace("http://", "")
        .replace(HOSTED_DOMAIN, "")
        .trim_matches('/')
        .to_string()
}

/// REST base URL. A URL with a scheme is used as given, a bare instance name
/// maps to the hosted domain.
pub fn base_url_for(url: &str, instance: &str) -> String {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        url.trim_end_matches('/').to_string()
    } else {
        format!("https://{}{}", instance, HOSTED_DOMAIN)
    }
}

/// First usable stanza by name. Input order does not matter.
pub fn select_account(stanzas: &[AccountStanza]) -> Option<&AccountStanza> {
    stanzas
        .iter()
        .filter(|s| !s.name.is_empty() && !s.is_reserved())
        .min_by(|a, b| a.name.cmp(&b.name))
}

/// Resolve the account to use from stanzas and secrets.
///
/// Fails closed: a stanza missing any required piece yields a
/// [`ConfigurationError`] rather than a partial account.
pub fn resolve_account(
    stanzas: &[AccountStanza],
    secrets: &[SecretEntry],
) -> Result<ResolvedAccount, ConfigurationError> {
    let stanza = select_account(stanzas).ok_or(ConfigurationError::NoAccountConfigured)?;

    let realm = realm_for(&stanza.name);
    let mut password: Option<String> = None;
    let mut client_secret: Option<String> = None;

    for secret in secrets.iter().filter(|s| s.realm == realm) {
        if secret.clear_password.is_empty() {
            continue;
        }
        if secret.names("password") {
            password = Some(secret.clear_password.clone());
        } else if secret.names("client_secret") {
            client_secret = Some(secret.clear_password.clone());
        }
    }

    let instance = instance_from_url(&stanza.url);
    let base_url = base_url_for(&stanza.url, &instance);

    let missing = |checks: &[(&str, bool)]| -> Option<String> {
        let names: Vec<&str> = checks
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join(", "))
        }
    };

    let credentials = if stanza.auth_type.is_oauth() {
        if let Some(missing) = missing(&[
            ("instance", !instance.is_empty()),
            ("client_id", !stanza.client_id.trim().is_empty()),
            ("client_secret", client_secret.is_some()),
        ]) {
            return Err(ConfigurationError::IncompleteOAuthAuth {
                account: stanza.name.clone(),
                missing,
            });
        }
        Credentials::OAuth {
            client_id: stanza.client_id.trim().to_string(),
            client_secret: client_secret.unwrap_or_default(),
            password,
        }
    } else {
        if let Some(missing) = missing(&[
            ("instance", !instance.is_empty()),
            ("username", !stanza.username.trim().is_empty()),
            ("password", password.is_some()),
        ]) {
            return Err(ConfigurationError::IncompleteBasicAuth {
                account: stanza.name.clone(),
                missing,
            });
        }
        Credentials::Basic {
            password: password.unwrap_or_default(),
        }
    };

    Ok(ResolvedAccount {
        account_name: stanza.name.clone(),
        instance,
        base_url,
        username: stanza.username.trim().to_string(),
        credentials,
    })
}
