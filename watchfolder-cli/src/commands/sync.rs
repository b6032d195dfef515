//! `watchfolder sync`: run one cycle now, or show what it would upload.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;

use watchfolder_core::types::{CycleContext, CycleId};
use watchfolder_core::Config;
use watchfolder_daemon::protocol::CMD_STATUS;
use watchfolder_daemon::{request_sync, send_request, DaemonError, DaemonRequest};
use watchfolder_sync::pipeline::{self, CycleReport, CycleSettings, PlanReport};
use watchfolder_sync::UploadOutcome;

use crate::uploader::HttpUploader;

/// Arguments for `watchfolder sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// List what would be uploaded without uploading or touching the state record.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, explicit_config: Option<&Path>) -> Result<()> {
        let config = super::load_config(explicit_config)?;
        let settings = CycleSettings::from_config(&config);

        if self.dry_run {
            let plan = pipeline::plan(&settings).context("dry run failed")?;
            if self.json {
                print_json(&plan)?;
            } else {
                print_plan(&plan);
            }
            return Ok(());
        }

        // A daemon serving this same folder and record owns them; route the
        // cycle through it. Anything else runs here under the record lock.
        let home = super::home_dir()?;
        let report: CycleReport = if daemon_serves(&home, &settings)? {
            match request_sync(&home) {
                Ok(summary) => report_from_daemon(summary)?,
                Err(DaemonError::DaemonNotRunning { .. }) => run_in_process(&config, &settings)?,
                Err(err) => return Err(err).context("daemon failed to run the cycle"),
            }
        } else {
            run_in_process(&config, &settings)?
        };

        if self.json {
            print_json(&report)?;
        } else {
            print_report(&report);
        }
        if report.failed > 0 {
            bail!(
                "{} of {} upload(s) failed; they will be retried on the next cycle",
                report.failed,
                report.planned
            );
        }
        Ok(())
    }
}

fn run_in_process(config: &Config, settings: &CycleSettings) -> Result<CycleReport> {
    let uploader = HttpUploader::new(&config.server);
    pipeline::run_cycle(&CycleContext::new(CycleId(1)), settings, &uploader)
        .context("sync cycle failed")
}

/// Whether a daemon is running and reconciles the same folder and record.
fn daemon_serves(home: &Path, settings: &CycleSettings) -> Result<bool> {
    let response = match send_request(home, &DaemonRequest::new(CMD_STATUS)) {
        Ok(response) => response,
        Err(DaemonError::DaemonNotRunning { .. }) => return Ok(false),
        Err(err) => return Err(err).context("failed to query daemon status"),
    };
    let (true, Some(status)) = (response.ok, response.data) else {
        bail!(
            "daemon refused status: {}",
            response.error.unwrap_or_default()
        );
    };

    let serves = |key: &str, ours: &Path| {
        status
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|theirs| same_location(Path::new(theirs), ours))
    };
    let same = serves("watch_folder", &settings.watch_folder)
        && serves("state_path", &settings.state_path);
    if !same {
        eprintln!(
            "note: the running daemon watches a different folder; syncing {} here",
            settings.watch_folder.display()
        );
    }
    Ok(same)
}

fn same_location(a: &Path, b: &Path) -> bool {
    a == b || matches!((canonical(a), canonical(b)), (Some(x), Some(y)) if x == y)
}

/// Canonical form of `path`, resolving through the parent when the file
/// itself does not exist yet.
fn canonical(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Some(resolved);
    }
    let parent = fs::canonicalize(path.parent()?).ok()?;
    Some(parent.join(path.file_name()?))
}

fn report_from_daemon(summary: Value) -> Result<CycleReport> {
    let report = summary
        .get("report")
        .context("daemon response has no cycle report")?;
    serde_json::from_value(report.clone()).context("unexpected cycle report from daemon")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON")?
    );
    Ok(())
}

fn print_plan(plan: &PlanReport) {
    if plan.uploads.is_empty() {
        println!(
            "[dry-run] ✓ {}: nothing to upload ({} file(s) tracked)",
            plan.watch_folder.display(),
            plan.scanned
        );
        return;
    }

    println!(
        "[dry-run] {} file(s) would be uploaded from {}",
        plan.uploads.len(),
        plan.watch_folder.display()
    );
    for upload in &plan.uploads {
        let reason = match upload.recorded {
            Some(at) => format!("modified since {at}"),
            None => "new".to_string(),
        };
        println!("  ~  {} ({reason})", upload.file_name);
    }
}

fn print_report(report: &CycleReport) {
    if report.planned == 0 {
        println!("✓ nothing to upload ({} file(s) up to date)", report.scanned);
        return;
    }

    println!(
        "✓ cycle {}: {} uploaded, {} failed ({} ms)",
        report.cycle_id, report.uploaded, report.failed, report.duration_ms
    );
    for outcome in &report.outcomes {
        match outcome {
            UploadOutcome::Uploaded { path } => println!("  ↑  {}", path.display()),
            UploadOutcome::Failed {
                path,
                error,
                detail,
            } => {
                println!("  ✗  {}: {error}", path.display());
                if let Some(detail) = detail {
                    println!("     {detail}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn same_location_sees_through_relative_segments() {
        let root = TempDir::new().unwrap();
        let videos = root.path().join("videos");
        fs::create_dir_all(&videos).unwrap();

        let detour = root.path().join("videos").join("..").join("videos");
        assert!(same_location(&videos, &detour));
        // The record may not exist before the first cycle.
        assert!(same_location(
            &videos.join("info.txt"),
            &detour.join("info.txt")
        ));
        assert!(!same_location(&videos, &root.path().join("other")));
    }
}
