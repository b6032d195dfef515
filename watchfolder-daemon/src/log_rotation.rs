//! Daemon log file: append-per-event writer plus size-based rotation.
//!
//! `daemon.log` is rotated once it reaches 10 MiB, keeping five copies:
//! `daemon.log.1` is the newest, `daemon.log.5` the oldest.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::MakeWriter;

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

/// `MakeWriter` that opens the log in append mode for every event.
///
/// Holding no handle between events means a rotation never leaves the
/// subscriber writing into `daemon.log.1`.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

/// Either the log file or, if it cannot be opened, nowhere.
pub enum LogWriter {
    File(File),
    Sink(io::Sink),
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogWriter::File(file) => file.write(buf),
            LogWriter::Sink(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogWriter::File(file) => file.flush(),
            LogWriter::Sink(sink) => sink.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match self.open() {
            Ok(file) => LogWriter::File(file),
            Err(_) => LogWriter::Sink(io::sink()),
        }
    }
}

/// Rotate `log_path` once it reaches `max_bytes`.
///
/// Returns `true` if a rotation happened. A missing log is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    remove_if_present(&numbered_path(log_path, max_files))?;
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// Rotate the daemon log under `home`; failures are only logged.
pub fn rotate_logs(home: &Path) {
    let log_path = crate::paths::log_path(home);
    match rotate_if_needed(&log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => {
            tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// `daemon.log` + 2 → `daemon.log.2`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.file_name().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
