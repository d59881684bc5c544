//! Ledger records: event → case and application → digital asset.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Persisted link between an event and the case created for it.
///
/// `case_sys_id` never changes once written. Timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMappingRecord {
    pub event_id: String,
    pub case_sys_id: String,
    pub instance: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: String,
}

impl CaseMappingRecord {
    pub fn new(
        event_id: impl Into<String>,
        case_sys_id: impl Into<String>,
        instance: impl Into<String>,
        created_by: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            case_sys_id: case_sys_id.into(),
            instance: instance.into(),
            created_at: now,
            updated_at: now,
            created_by: created_by.into(),
        }
    }
}

/// The only fields an existing case mapping may change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingPatch {
    pub updated_at: i64,
    pub updated_by: String,
}

/// Result of the last lookup of an application's digital asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Found,
    NotFound,
    /// Previously found, missing on the latest lookup
    Lost,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::NotFound => "not_found",
            Self::Lost => "lost",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "found" => Ok(Self::Found),
            "not_found" => Ok(Self::NotFound),
            "lost" => Ok(Self::Lost),
            other => Err(format!("unknown sync status '{}'", other)),
        }
    }
}

/// Persisted link between an application name and its asset record.
/// `sys_id` is empty while the asset has never been found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMappingRecord {
    pub app_name: String,
    pub sys_id: String,
    pub sync_status: SyncStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: String,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPatch {
    pub sys_id: String,
    pub sync_status: SyncStatus,
    pub updated_at: i64,
    pub updated_by: String,
}
