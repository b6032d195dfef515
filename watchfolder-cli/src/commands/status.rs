//! `watchfolder status`: state record against the watched directory.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use watchfolder_core::types::{DirectoryListing, FileName, StateMapping, Timestamp, Tracked};
use watchfolder_sync::pipeline::CycleSettings;
use watchfolder_sync::scanner::scan;

/// Arguments for `watchfolder status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, explicit_config: Option<&Path>) -> Result<()> {
        let config = super::load_config(explicit_config)?;
        let settings = CycleSettings::from_config(&config);

        let record = settings
            .store()
            .load()
            .context("failed to read the state record")?;
        let listing = scan(&settings.watch_folder, &settings.extension)
            .context("failed to scan the watch folder")?;

        let rows = build_rows(&record, &listing);
        if self.json {
            let payload = StatusJson {
                watch_folder: settings.watch_folder.display().to_string(),
                state_path: settings.state_path.display().to_string(),
                pending: rows.iter().filter(|r| r.status.is_pending()).count(),
                files: rows,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&settings, rows);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum FileStatus {
    Uploaded,
    New,
    Modified,
    /// Previous upload attempt failed.
    Retry,
    /// Tracked but no longer in the directory.
    Missing,
}

impl FileStatus {
    fn is_pending(self) -> bool {
        matches!(self, FileStatus::New | FileStatus::Modified | FileStatus::Retry)
    }

    fn label(self) -> &'static str {
        match self {
            FileStatus::Uploaded => "UPLOADED",
            FileStatus::New => "NEW",
            FileStatus::Modified => "MODIFIED",
            FileStatus::Retry => "RETRY",
            FileStatus::Missing => "MISSING",
        }
    }

    fn indicator(self) -> String {
        match self {
            FileStatus::Uploaded => "■".green().bold().to_string(),
            FileStatus::New => "■".cyan().bold().to_string(),
            FileStatus::Modified => "■".yellow().bold().to_string(),
            FileStatus::Retry => "■".red().bold().to_string(),
            FileStatus::Missing => "■".bright_black().bold().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FileRow {
    file: String,
    status: FileStatus,
    modified: Option<Timestamp>,
    uploaded: Option<Timestamp>,
}

#[derive(Serialize)]
struct StatusJson {
    watch_folder: String,
    state_path: String,
    pending: usize,
    files: Vec<FileRow>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "modified")]
    modified: String,
    #[tabled(rename = "last upload")]
    uploaded: String,
}

fn build_rows(record: &StateMapping, listing: &DirectoryListing) -> Vec<FileRow> {
    let names: BTreeSet<&FileName> = record.keys().chain(listing.files.keys()).collect();
    names
        .into_iter()
        .map(|name| {
            let modified = listing.files.get(name).copied();
            let tracked = record.get(name).copied();
            let status = match (modified, tracked) {
                (None, _) => FileStatus::Missing,
                (Some(_), None) => FileStatus::New,
                (Some(_), Some(Tracked::NeverTracked)) => FileStatus::Retry,
                (Some(now), Some(Tracked::At(then))) if now == then => FileStatus::Uploaded,
                (Some(_), Some(Tracked::At(_))) => FileStatus::Modified,
            };
            FileRow {
                file: name.0.clone(),
                status,
                modified,
                uploaded: tracked.and_then(|t| t.timestamp()),
            }
        })
        .collect()
}

fn print_table(settings: &CycleSettings, rows: Vec<FileRow>) {
    let pending = rows.iter().filter(|r| r.status.is_pending()).count();
    println!(
        "Watchfolder v{} | {} | {} files | {} pending",
        env!("CARGO_PKG_VERSION"),
        settings.watch_folder.display(),
        rows.len(),
        pending,
    );

    if rows.is_empty() {
        println!("No matching files yet.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    println!(
        "Indicators: {} UPLOADED  {} NEW  {} MODIFIED  {} RETRY  {} MISSING",
        FileStatus::Uploaded.indicator(),
        FileStatus::New.indicator(),
        FileStatus::Modified.indicator(),
        FileStatus::Retry.indicator(),
        FileStatus::Missing.indicator(),
    );
    println!("{separator}");

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            file: row.file,
            status: format!("{} {}", row.status.indicator(), row.status.label()),
            modified: row.modified.map(|t| t.to_string()).unwrap_or_default(),
            uploaded: row
                .uploaded
                .map(|t| t.to_string())
                .unwrap_or_else(|| "never".to_string()),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending > 0 {
        println!("Run 'watchfolder sync' or start the daemon to upload pending files.");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn ts(h: u32) -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap())
    }

    #[test]
    fn every_file_gets_one_status() {
        let mut record = StateMapping::new();
        record.insert(FileName::from("same.mp4"), Tracked::At(ts(1)));
        record.insert(FileName::from("changed.mp4"), Tracked::At(ts(1)));
        record.insert(FileName::from("failed.mp4"), Tracked::NeverTracked);
        record.insert(FileName::from("gone.mp4"), Tracked::At(ts(1)));

        let mut listing = DirectoryListing::new("/watch");
        listing.files.insert(FileName::from("same.mp4"), ts(1));
        listing.files.insert(FileName::from("changed.mp4"), ts(2));
        listing.files.insert(FileName::from("failed.mp4"), ts(3));
        listing.files.insert(FileName::from("fresh.mp4"), ts(4));

        let statuses: Vec<(String, FileStatus)> = build_rows(&record, &listing)
            .into_iter()
            .map(|r| (r.file, r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("changed.mp4".to_string(), FileStatus::Modified),
                ("failed.mp4".to_string(), FileStatus::Retry),
                ("fresh.mp4".to_string(), FileStatus::New),
                ("gone.mp4".to_string(), FileStatus::Missing),
                ("same.mp4".to_string(), FileStatus::Uploaded),
            ]
        );
    }
}
