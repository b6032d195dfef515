//! # watchfolder-sync
//!
//! Reconciliation engine: state record, directory scan, diff, upload driver.
//!
//! Call [`pipeline::run_cycle`] to perform one full
//! scan → diff → upload → persist cycle, or [`pipeline::plan`] to compute
//! what a cycle would upload without touching the network or the record.

pub mod cycle_lock;
pub mod error;
pub mod pipeline;
pub mod reconciler;
pub mod scanner;
pub mod state_store;
pub mod upload;

pub use cycle_lock::CycleLock;
pub use error::{SyncError, UploadError};
pub use pipeline::{CycleReport, CycleSettings, PlanReport};
pub use state_store::StateStore;
pub use upload::{UploadOutcome, UploadRequest, UploadTarget, Uploader};
