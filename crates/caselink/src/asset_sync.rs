//! Application → digital asset sync.
//!
//! Find-only: an application name is looked up in the asset table and the
//! result is remembered in the ledger. Asset records are never created.
//! A name previously found is re-verified on every run and marked `lost`
//! when it disappears.

use crate::ledger::AssetStore;
use crate::ticketing::AssetLookup;
use caselink_shared::{AssetMappingRecord, AssetPatch, RawRecord, SyncStatus};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// App name spellings accepted in sync payloads, in priority order
pub const APP_NAME_FIELDS: &[&str] = &[
    "gen_ai.app.name",
    "app_name",
    "gen_ai_app_name",
    "\"gen_ai.app.name\"",
];

/// App name carried by a result row
pub fn app_name_of(record: &RawRecord) -> Option<String> {
    caselink_shared::context::first_field(record, APP_NAME_FIELDS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResultStatus {
    Success,
    Skipped,
    Error,
}

/// Result of syncing one app name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetSyncResult {
    pub app_name: String,
    pub status: SyncResultStatus,
    pub sys_id: Option<String>,
    pub sync_status: Option<SyncStatus>,
    pub message: String,
}

impl AssetSyncResult {
    fn error(app_name: &str, message: impl Into<String>) -> Self {
        Self {
            app_name: app_name.to_string(),
            status: SyncResultStatus::Error,
            sys_id: None,
            sync_status: None,
            message: message.into(),
        }
    }

    fn success(app_name: &str, sys_id: &str, sync_status: SyncStatus, message: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            status: SyncResultStatus::Success,
            sys_id: Some(sys_id.to_string()),
            sync_status: Some(sync_status),
            message: message.to_string(),
        }
    }
}

/// Counters over one sync run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub errors: usize,
}

impl SyncSummary {
    pub fn record(&mut self, result: &AssetSyncResult) {
        self.processed += 1;
        match result.status {
            SyncResultStatus::Success | SyncResultStatus::Skipped => self.succeeded += 1,
            SyncResultStatus::Error => self.errors += 1,
        }
    }

    /// A run fails only when nothing succeeded and something errored
    pub fn failed(&self) -> bool {
        self.errors > 0 && self.succeeded == 0
    }
}

pub struct AssetSync<'a> {
    lookup: &'a dyn AssetLookup,
    store: &'a dyn AssetStore,
    username: String,
}

impl<'a> AssetSync<'a> {
    pub fn new(
        lookup: &'a dyn AssetLookup,
        store: &'a dyn AssetStore,
        username: impl Into<String>,
    ) -> Self {
        Self {
            lookup,
            store,
            username: username.into(),
        }
    }

    pub fn sync(&self, app_name: &str) -> AssetSyncResult {
        let existing = match self.store.find_asset(app_name) {
            Ok(found) => found,
            Err(e) => {
                warn!("Asset mapping lookup failed for '{}': {}", app_name, e);
                None
            }
        };

        match existing {
            Some(mapping) if mapping.sync_status == SyncStatus::Found && !mapping.sys_id.is_empty() => {
                self.reverify(app_name, &mapping)
            }
            Some(mapping) => {
                info!(
                    "Skipping '{}': already mapped with status={}",
                    app_name, mapping.sync_status
                );
                AssetSyncResult {
                    app_name: app_name.to_string(),
                    status: SyncResultStatus::Skipped,
                    sys_id: Some(mapping.sys_id.clone()),
                    sync_status: Some(mapping.sync_status),
                    message: format!("Already mapped with status: {}", mapping.sync_status),
                }
            }
            None => self.map_new(app_name),
        }
    }

    fn reverify(&self, app_name: &str, mapping: &AssetMappingRecord) -> AssetSyncResult {
        info!("Re-verifying '{}' (sys_id={})", app_name, mapping.sys_id);
        let found = match self.lookup.find_asset(app_name) {
            Ok(found) => found,
            Err(e) => return AssetSyncResult::error(app_name, e.to_string()),
        };

        if let Some(asset) = found {
            return AssetSyncResult::success(
                app_name,
                &asset.sys_id,
                SyncStatus::Found,
                "Asset still exists",
            );
        }

        warn!("'{}' no longer found, marking as lost", app_name);
        let patch = AssetPatch {
            sys_id: String::new(),
            sync_status: SyncStatus::Lost,
            updated_at: Utc::now().timestamp(),
            updated_by: self.username.clone(),
        };
        match self.store.update_asset(app_name, &patch) {
            Ok(()) => AssetSyncResult::success(
                app_name,
                "",
                SyncStatus::Lost,
                "Asset no longer exists, marked as lost",
            ),
            Err(e) => AssetSyncResult::error(
                app_name,
                format!("Failed to record lost status: {}", e),
            ),
        }
    }

    fn map_new(&self, app_name: &str) -> AssetSyncResult {
        let found = match self.lookup.find_asset(app_name) {
            Ok(found) => found,
            Err(e) => return AssetSyncResult::error(app_name, e.to_string()),
        };

        let (sys_id, sync_status, message) = match found {
            Some(asset) => {
                info!("Found '{}' with sys_id={}", app_name, asset.sys_id);
                (asset.sys_id, SyncStatus::Found, "Asset found and mapped")
            }
            None => {
                info!("'{}' not found, marking as not_found", app_name);
                (String::new(), SyncStatus::NotFound, "Asset not found, marked for alert")
            }
        };

        let now = Utc::now().timestamp();
        let record = AssetMappingRecord {
            app_name: app_name.to_string(),
            sys_id: sys_id.clone(),
            sync_status,
            created_at: now,
            updated_at: now,
            created_by: self.username.clone(),
            updated_by: None,
        };
        match self.store.save_asset(&record) {
            Ok(()) => AssetSyncResult::success(app_name, &sys_id, sync_status, message),
            Err(e) => AssetSyncResult::error(app_name, format!("Failed to save mapping: {}", e)),
        }
    }
}
