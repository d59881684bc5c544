//! Shared types and pure logic for caselink components.
//!
//! Nothing in this crate performs I/O. Network, storage and process
//! plumbing live in the `caselink` crate.

pub mod account;
pub mod context;
pub mod error;
pub mod escape;
pub mod finding;
pub mod mapping;
pub mod outcome;

pub use account::{AccountStanza, AuthType, Credentials, ResolvedAccount, SecretEntry};
pub use context::{EventContext, RawRecord};
pub use error::{
    ApiError, AuthError, CaseError, ConfigurationError, EventSourceError, StoreError,
    SummarizationError,
};
pub use finding::Finding;
pub use mapping::{AssetMappingRecord, AssetPatch, CaseMappingRecord, MappingPatch, SyncStatus};
pub use outcome::{CaseMode, CaseOutcome, CaseStatus};

/// Default case table
pub const DEFAULT_CASE_TABLE: &str = "sn_ai_case_mgmt_ai_case";

/// Default digital asset table
pub const DEFAULT_ASSET_TABLE: &str = "alm_ai_system_digital_asset";

/// Record type stamped on every created case
pub const CASE_TYPE: &str = "AI Case";
