//! Upload driver: run the plan, revert the entries that failed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use watchfolder_core::types::{CycleContext, StateMapping, UploadPlan};

use crate::error::UploadError;

/// Everything the remote side needs to accept one file.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub user_id: &'a str,
    pub user_key: &'a str,
    pub folder_id: &'a str,
    /// Name shown remotely; the local file name.
    pub display_name: &'a str,
    pub local_path: &'a Path,
    pub part_size_bytes: u64,
}

/// Transport that pushes one file to the remote service.
///
/// Calls are blocking. `Ok(())` means the remote side durably accepted the
/// content.
pub trait Uploader: Send + Sync {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<(), UploadError>;
}

/// Identity and destination shared by every upload of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub user_id: String,
    pub user_key: String,
    pub folder_id: String,
    pub part_size_bytes: u64,
}

/// Outcome of one planned upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded {
        path: PathBuf,
    },
    Failed {
        path: PathBuf,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl UploadOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, UploadOutcome::Failed { .. })
    }
}

/// Attempt every task in `plan` order and return the finalized mapping.
///
/// A failed upload restores the task's revert value in `proposed`, so the
/// next cycle detects the same change again. Failures never stop the
/// remaining tasks.
pub fn execute(
    cycle: &CycleContext,
    plan: &UploadPlan,
    mut proposed: StateMapping,
    uploader: &dyn Uploader,
    target: &UploadTarget,
) -> (StateMapping, Vec<UploadOutcome>) {
    let mut outcomes = Vec::with_capacity(plan.len());

    for task in plan {
        let request = UploadRequest {
            user_id: &target.user_id,
            user_key: &target.user_key,
            folder_id: &target.folder_id,
            display_name: &task.file_name.0,
            local_path: &task.full_path,
            part_size_bytes: target.part_size_bytes,
        };

        match uploader.upload(&request) {
            Ok(()) => {
                tracing::info!(
                    "[cycle {}] uploaded {}",
                    cycle.id,
                    task.full_path.display()
                );
                outcomes.push(UploadOutcome::Uploaded {
                    path: task.full_path.clone(),
                });
            }
            Err(err) => {
                proposed.insert(task.file_name.clone(), task.revert_to);
                let detail = err.detail();
                tracing::error!(
                    "[cycle {}] uploading {} failed: {}",
                    cycle.id,
                    task.full_path.display(),
                    err
                );
                if let Some(detail) = &detail {
                    tracing::error!("[cycle {}] failure detail: {}", cycle.id, detail);
                }
                outcomes.push(UploadOutcome::Failed {
                    path: task.full_path.clone(),
                    error: err.to_string(),
                    detail,
                });
            }
        }
    }

    (proposed, outcomes)
}
