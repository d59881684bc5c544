//! Credential store collaborators and account resolution.
//!
//! The resolver only needs stanzas and secrets. Where they come from is up
//! to the store: the CLI ships a TOML file store, tests use the in-memory
//! one.

use caselink_shared::account::{resolve_account, AccountStanza, ResolvedAccount, SecretEntry};
use caselink_shared::ConfigurationError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of account stanzas and secret entries
pub trait CredentialStore {
    fn accounts(&self) -> Result<Vec<AccountStanza>, ConfigurationError>;
    fn secrets(&self) -> Result<Vec<SecretEntry>, ConfigurationError>;
}

/// Resolve the invocation's account from `store`. Never retries.
pub fn resolve(store: &dyn CredentialStore) -> Result<ResolvedAccount, ConfigurationError> {
    let accounts = store.accounts()?;
    let secrets = store.secrets()?;
    match resolve_account(&accounts, &secrets) {
        Ok(account) => {
            info!(
                "Using ticketing account '{}' ({} auth, instance {})",
                account.account_name,
                account.auth_label(),
                account.instance
            );
            Ok(account)
        }
        Err(e) => {
            warn!("Account resolution failed: {}", e);
            Err(e)
        }
    }
}

/// On-disk layout of the credentials file
#[derive(Debug, Default, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    accounts: BTreeMap<String, AccountStanza>,
    #[serde(default)]
    secrets: Vec<SecretEntry>,
}

/// TOML credentials file:
///
/// ```toml
/// [accounts.prod]
/// url = "https://dev0001.service-now.com"
/// auth_type = "basic"
/// username = "svc_caselink"
///
/// [[secrets]]
/// name = "caselink_account__prod:password:"
/// realm = "caselink_account__prod"
/// clear_password = "..."
/// ```
///
/// A missing file is an empty store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CredentialFile, ConfigurationError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No credentials file at {}", self.path.display());
                return Ok(CredentialFile::default());
            }
            Err(e) => {
                return Err(ConfigurationError::SecretLookupFailed(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        toml::from_str(&content).map_err(|e| {
            ConfigurationError::SecretLookupFailed(format!("{}: {}", self.path.display(), e))
        })
    }
}

impl CredentialStore for FileCredentialStore {
    fn accounts(&self) -> Result<Vec<AccountStanza>, ConfigurationError> {
        Ok(self
            .read()?
            .accounts
            .into_iter()
            .map(|(name, mut stanza)| {
                stanza.name = name;
                stanza
            })
            .collect())
    }

    fn secrets(&self) -> Result<Vec<SecretEntry>, ConfigurationError> {
        Ok(self.read()?.secrets)
    }
}

/// Store backed by plain vectors
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    pub accounts: Vec<AccountStanza>,
    pub secrets: Vec<SecretEntry>,
}

impl InMemoryCredentialStore {
    pub fn new(accounts: Vec<AccountStanza>, secrets: Vec<SecretEntry>) -> Self {
        Self { accounts, secrets }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn accounts(&self) -> Result<Vec<AccountStanza>, ConfigurationError> {
        Ok(self.accounts.clone())
    }

    fn secrets(&self) -> Result<Vec<SecretEntry>, ConfigurationError> {
        Ok(self.secrets.clone())
    }
}
