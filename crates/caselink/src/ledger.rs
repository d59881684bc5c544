//! SQLite mapping ledger.
//!
//! One database holds two tables: event → case mappings and application →
//! asset mappings. Unique keys are enforced by SQLite, so a second writer
//! racing on the same key gets [`StoreError::Duplicate`] instead of a
//! second row.

use caselink_shared::{
    AssetMappingRecord, AssetPatch, CaseMappingRecord, MappingPatch, StoreError, SyncStatus,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

/// Event → case mapping persistence
pub trait MappingStore {
    fn find(&self, event_id: &str) -> Result<Option<CaseMappingRecord>, StoreError>;
    fn save(&self, record: &CaseMappingRecord) -> Result<(), StoreError>;
    /// Touch `updated_at`/`updated_by` of an existing mapping
    fn update(&self, event_id: &str, patch: &MappingPatch) -> Result<(), StoreError>;
}

/// Application → asset mapping persistence
pub trait AssetStore {
    fn find_asset(&self, app_name: &str) -> Result<Option<AssetMappingRecord>, StoreError>;
    fn save_asset(&self, record: &AssetMappingRecord) -> Result<(), StoreError>;
    fn update_asset(&self, app_name: &str, patch: &AssetPatch) -> Result<(), StoreError>;
}

/// SQLite-backed ledger
pub struct Ledger {
    conn: Connection,
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Unique constraint failures become `Duplicate(key)`
fn insert_error(e: rusqlite::Error, key: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Duplicate(key.to_string())
        }
        _ => backend(e),
    }
}

impl Ledger {
    /// Open or create the ledger at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path).map_err(backend)?;

        // WAL: readers never block the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(backend)?;

        let ledger = Self { conn };
        ledger.init_schema()?;
        info!("Opened mapping ledger at {}", path.display());
        Ok(ledger)
    }

    /// Private in-memory ledger
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS case_mappings (
                    event_id TEXT NOT NULL UNIQUE,
                    case_sys_id TEXT NOT NULL,
                    instance TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    created_by TEXT NOT NULL,
                    updated_by TEXT
                );

                CREATE TABLE IF NOT EXISTS asset_mappings (
                    app_name TEXT NOT NULL UNIQUE,
                    sys_id TEXT NOT NULL,
                    sync_status TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    created_by TEXT NOT NULL,
                    updated_by TEXT
                );
                "#,
            )
            .map_err(backend)
    }

    /// Number of case mappings
    pub fn case_count(&self) -> Result<usize, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM case_mappings", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(backend)
    }
}

impl MappingStore for Ledger {
    fn find(&self, event_id: &str) -> Result<Option<CaseMappingRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT event_id, case_sys_id, instance, created_at, updated_at, created_by
                 FROM case_mappings WHERE event_id = ?1",
                params![event_id],
                |row| {
                    Ok(CaseMappingRecord {
                        event_id: row.get(0)?,
                        case_sys_id: row.get(1)?,
                        instance: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                        created_by: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(backend)
    }

    fn save(&self, record: &CaseMappingRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO case_mappings
                 (event_id, case_sys_id, instance, created_at, updated_at, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &record.event_id,
                    &record.case_sys_id,
                    &record.instance,
                    record.created_at,
                    record.updated_at,
                    &record.created_by
                ],
            )
            .map_err(|e| insert_error(e, &record.event_id))?;
        debug!("Saved mapping {} -> {}", record.event_id, record.case_sys_id);
        Ok(())
    }

    fn update(&self, event_id: &str, patch: &MappingPatch) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE case_mappings SET updated_at = ?1, updated_by = ?2 WHERE event_id = ?3",
                params![patch.updated_at, &patch.updated_by, event_id],
            )
            .map_err(backend)?;
        if changed == 0 {
            return Err(StoreError::NotFound(event_id.to_string()));
        }
        Ok(())
    }
}

impl AssetStore for Ledger {
    fn find_asset(&self, app_name: &str) -> Result<Option<AssetMappingRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT app_name, sys_id, sync_status, created_at, updated_at, created_by, updated_by
                 FROM asset_mappings WHERE app_name = ?1",
                params![app_name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(backend)?;

        row.map(
            |(app_name, sys_id, status, created_at, updated_at, created_by, updated_by)| {
                let sync_status = status.parse::<SyncStatus>().map_err(StoreError::Backend)?;
                Ok(AssetMappingRecord {
                    app_name,
                    sys_id,
                    sync_status,
                    created_at,
                    updated_at,
                    created_by,
                    updated_by,
                })
            },
        )
        .transpose()
    }

    fn save_asset(&self, record: &AssetMappingRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO asset_mappings
                 (app_name, sys_id, sync_status, created_at, updated_at, created_by, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &record.app_name,
                    &record.sys_id,
                    record.sync_status.as_str(),
                    record.created_at,
                    record.updated_at,
                    &record.created_by,
                    &record.updated_by
                ],
            )
            .map_err(|e| insert_error(e, &record.app_name))?;
        Ok(())
    }

    fn update_asset(&self, app_name: &str, patch: &AssetPatch) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE asset_mappings
                 SET sys_id = ?1, sync_status = ?2, updated_at = ?3, updated_by = ?4
                 WHERE app_name = ?5",
                params![
                    &patch.sys_id,
                    patch.sync_status.as_str(),
                    patch.updated_at,
                    &patch.updated_by,
                    app_name
                ],
            )
            .map_err(backend)?;
        if changed == 0 {
            return Err(StoreError::NotFound(app_name.to_string()));
        }
        Ok(())
    }
}
