//! One reconciliation cycle: `save(execute(diff(load(), scan())))`.
//!
//! Shared by the `watchfolder sync` command and the daemon scheduler. Each
//! cycle holds the [`CycleLock`] of its state record from load to save.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use watchfolder_core::types::{CycleContext, CycleId, FileName, Timestamp};
use watchfolder_core::Config;

use crate::cycle_lock::CycleLock;
use crate::error::SyncError;
use crate::reconciler::diff;
use crate::scanner::scan;
use crate::state_store::StateStore;
use crate::upload::{execute, UploadOutcome, UploadTarget, Uploader};

/// Inputs of a cycle, extracted once from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    pub watch_folder: PathBuf,
    pub extension: String,
    pub state_path: PathBuf,
    pub target: UploadTarget,
}

impl CycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            watch_folder: config.watch_folder.clone(),
            extension: config.extension.clone(),
            state_path: config.info_file_path.clone(),
            target: UploadTarget {
                user_id: config.user_id.clone(),
                user_key: config.user_key.clone(),
                folder_id: config.folder_id.clone(),
                part_size_bytes: config.part_size_bytes,
            },
        }
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(&self.state_path)
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub started_at: DateTime<Utc>,
    /// Matching files found in the watch folder.
    pub scanned: usize,
    pub planned: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub outcomes: Vec<UploadOutcome>,
    pub duration_ms: u64,
}

/// A file a cycle would upload right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpload {
    pub file_name: FileName,
    pub path: PathBuf,
    pub modified: Timestamp,
    /// Last confirmed upload, `None` if the file was never uploaded.
    pub recorded: Option<Timestamp>,
}

/// Dry-run result: what the next cycle would upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub watch_folder: PathBuf,
    pub state_path: PathBuf,
    pub scanned: usize,
    pub uploads: Vec<PlannedUpload>,
}

/// Run one full cycle.
///
/// Blocks while another cycle on the same state record is running. A scan or
/// load failure aborts before any upload and leaves the record untouched.
/// Upload failures are absorbed into the report. A persist failure is
/// returned after the uploads already happened; the previous record stays in
/// place and the next cycle uploads the same files again.
pub fn run_cycle(
    cycle: &CycleContext,
    settings: &CycleSettings,
    uploader: &dyn Uploader,
) -> Result<CycleReport, SyncError> {
    let _lock = CycleLock::acquire(&settings.state_path)?;
    let started = Instant::now();
    let store = settings.store();

    let prior = store.load()?;
    let current = scan(&settings.watch_folder, &settings.extension)?;
    let (plan, proposed) = diff(&prior, &current);

    if plan.is_empty() {
        tracing::debug!("[cycle {}] nothing to upload", cycle.id);
    } else {
        tracing::info!(
            "[cycle {}] {} file(s) to upload from {}",
            cycle.id,
            plan.len(),
            settings.watch_folder.display()
        );
    }

    let (finalized, outcomes) = execute(cycle, &plan, proposed, uploader, &settings.target);

    store.save(&finalized).map_err(|err| {
        tracing::error!("[cycle {}] {}", cycle.id, err);
        err
    })?;

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    let report = CycleReport {
        cycle_id: cycle.id,
        started_at: cycle.started_at,
        scanned: current.files.len(),
        planned: plan.len(),
        uploaded: outcomes.len() - failed,
        failed,
        outcomes,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    if report.planned > 0 {
        tracing::info!(
            "[cycle {}] done: {} uploaded, {} failed in {}ms",
            cycle.id,
            report.uploaded,
            report.failed,
            report.duration_ms
        );
    }
    Ok(report)
}

/// Compute what [`run_cycle`] would upload, without uploading or writing.
pub fn plan(settings: &CycleSettings) -> Result<PlanReport, SyncError> {
    let prior = settings.store().load()?;
    let current = scan(&settings.watch_folder, &settings.extension)?;
    let (tasks, _) = diff(&prior, &current);

    let uploads = tasks
        .into_iter()
        .map(|task| PlannedUpload {
            modified: current.files[&task.file_name],
            recorded: task.revert_to.timestamp(),
            path: task.full_path,
            file_name: task.file_name,
        })
        .collect();

    Ok(PlanReport {
        watch_folder: settings.watch_folder.clone(),
        state_path: settings.state_path.clone(),
        scanned: current.files.len(),
        uploads,
    })
}
