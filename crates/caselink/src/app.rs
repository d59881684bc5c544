//! Per-invocation wiring.
//!
//! Collaborators are built once from the configuration and lent to the
//! orchestrator and the asset sync. Only an unopenable ledger or an
//! unusable HTTP stack is fatal here; an unresolvable account is kept as an
//! error and reported per event.

use crate::asset_sync::AssetSync;
use crate::config::Config;
use crate::credentials::{self, CredentialStore, FileCredentialStore};
use crate::events::{ContextBuilder, JsonlEventSource};
use crate::ledger::Ledger;
use crate::orchestrator::{CaseOptions, CaseOrchestrator, EventLink};
use crate::summarizer::{HttpSummaryBackend, SummaryBackend, Summarizer};
use crate::ticketing::{CaseApi, TicketingClient};
use anyhow::{Context, Result};
use caselink_shared::ConfigurationError;
use tracing::{debug, info};

pub struct App {
    pub config: Config,
    ledger: Ledger,
    client: Result<TicketingClient, ConfigurationError>,
    events: JsonlEventSource,
    summary: Option<HttpSummaryBackend>,
}

impl App {
    /// Build from config, reading credentials from the configured file
    pub fn open(config: Config) -> Result<Self> {
        let store = FileCredentialStore::new(&config.credentials.path);
        Self::open_with(config, &store)
    }

    /// Build from config with an explicit credential store
    pub fn open_with(config: Config, credentials: &dyn CredentialStore) -> Result<Self> {
        let ledger = Ledger::open_at(&config.store.ledger_path).with_context(|| {
            format!(
                "Failed to open mapping ledger at {}",
                config.store.ledger_path.display()
            )
        })?;

        let client = match credentials::resolve(credentials) {
            Ok(account) => Ok(TicketingClient::new(account, config.ticketing.clone())?),
            Err(e) => Err(e),
        };

        let summary = if config.summary.enabled {
            info!(
                "AI summary enabled ({} at {})",
                config.summary.model, config.summary.endpoint
            );
            Some(HttpSummaryBackend::new(config.summary.clone())?)
        } else {
            debug!("AI summary disabled, structured fallback only");
            None
        };

        let events = JsonlEventSource::new(&config.events.path);

        Ok(Self {
            config,
            ledger,
            client,
            events,
            summary,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn client(&self) -> Result<&TicketingClient, ConfigurationError> {
        self.client.as_ref().map_err(Clone::clone)
    }

    pub fn orchestrator(&self, options: CaseOptions) -> CaseOrchestrator<'_> {
        let api = self
            .client
            .as_ref()
            .map(|c| c as &dyn CaseApi)
            .map_err(Clone::clone);
        let summary = self.summary.as_ref().map(|b| b as &dyn SummaryBackend);

        CaseOrchestrator::new(
            api,
            &self.ledger,
            ContextBuilder::new(&self.events, self.config.events.lookback_days),
            Summarizer::new(summary),
            EventLink {
                search_url: self.config.events.search_url.clone(),
                index: self.config.events.index.clone(),
            },
            options,
        )
    }

    pub fn asset_sync(&self) -> Result<AssetSync<'_>, ConfigurationError> {
        let client = self.client()?;
        Ok(AssetSync::new(
            client,
            &self.ledger,
            client.account().username.clone(),
        ))
    }
}
