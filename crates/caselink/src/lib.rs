//! caselink: links AI-observability anomaly events to ticketing cases.
//!
//! Exactly one case is created per event identifier, however many times an
//! event is triggered. The mapping ledger is consulted before any create
//! call and written right after one succeeds.

pub mod app;
pub mod asset_sync;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod events;
pub mod ledger;
pub mod orchestrator;
pub mod summarizer;
pub mod ticketing;
pub mod token;

pub use app::App;
pub use config::Config;
pub use orchestrator::{CaseOptions, CaseOrchestrator, EventRequest};
