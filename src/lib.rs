//! Traffic Console Library
//!
//! Orchestrates up to K concurrent video-inference sessions against a
//! remote detection backend.
//!
//! ## Architecture (8 Components)
//!
//! 1. SourceClassifier - Human readable source labels
//! 2. SlotPool - Fixed set of session slots and their lifecycle state
//! 3. InferenceClient - Inference backend adapter
//! 4. SessionStore - Persistence backend adapter
//! 5. StatsPoller - Per-slot stats polling task
//! 6. SessionOrchestrator - Start/stop lifecycle, models, settings
//! 7. SessionExport - Aggregate save, ledger, JSON/CSV export
//! 8. WebAPI - Operator REST endpoints
//!
//! ## Design Principles
//!
//! - One owned record per slot; the poller handle lives inside it
//! - Local slot state is authoritative; backend stops are best effort
//! - Backends sit behind traits so the lifecycle is testable in-process

pub mod source_classifier;
pub mod slot_pool;
pub mod inference_client;
pub mod session_store;
pub mod stats_poller;
pub mod session_orchestrator;
pub mod session_export;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
