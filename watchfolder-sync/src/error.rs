//! Error types for watchfolder-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The watched directory is missing or unreadable.
    #[error("cannot scan watch folder {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the state record failed for a reason other than absence.
    #[error("cannot read state record {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cycle lock next to the state record could not be taken.
    #[error("cannot lock state record {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the state record failed; the previous record is still in place.
    #[error("cannot persist state record {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single file's upload attempt failed.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The local file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network-level failure (DNS, connect, TLS, timeout).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The remote side answered but refused the upload.
    #[error("remote rejected upload with status {status}")]
    Rejected { status: u16, body: String },

    /// Remote answered with something the uploader could not interpret.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl UploadError {
    /// Extra context beyond the display message, when the collaborator has any.
    pub fn detail(&self) -> Option<String> {
        match self {
            UploadError::Io { source, .. } => Some(format!("{:?}", source.kind())),
            UploadError::Rejected { body, .. } if !body.trim().is_empty() => {
                Some(body.trim().to_string())
            }
            UploadError::Rejected { .. }
            | UploadError::Transport { .. }
            | UploadError::Protocol(_) => None,
        }
    }
}

pub(crate) fn scan_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Scan {
        path: path.into(),
        source,
    }
}

pub(crate) fn persist_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Persist {
        path: path.into(),
        source,
    }
}

pub(crate) fn lock_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Lock {
        path: path.into(),
        source,
    }
}
