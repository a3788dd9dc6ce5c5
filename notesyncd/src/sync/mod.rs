pub mod blobs;
pub mod config;
pub mod context;
mod cursor;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod paths;
pub mod pull;
mod pull_notes;
pub mod push;
mod push_notes;
mod sharing;
pub mod store;
pub mod validate;
pub mod worker;

pub use config::{SyncConfig, SyncInterval};
pub use context::{StatusSnapshot, SyncEvent, SyncObserver, SyncPhase, SyncStatus};
pub use error::SyncError;
pub use orchestrator::{CycleOutcome, CycleSummary, SyncOrchestrator};
pub use store::{LocalStore, StoreError, SyncState};
pub use worker::{SyncHandle, SyncWorker, WorkerError};


#[cfg(test)]
mod engine_tests;
