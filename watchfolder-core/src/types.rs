//! Domain types for the watch-folder reconciler.
//!
//! All path fields use `PathBuf`; file identity inside the watched directory
//! is the bare file name ([`FileName`]), compared case-sensitively.
//! Timestamps are always whole seconds in UTC.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Text layout of a persisted timestamp: ISO-8601, UTC, no fractional part.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Persisted text of [`Tracked::NeverTracked`].
pub const NEVER_TRACKED: &str = "never";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a file inside the watched directory (no path components).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileName(pub String);

impl FileName {
    /// Whether `name` survives a round trip through the `name;timestamp`
    /// state record.
    pub fn is_storable(name: &str) -> bool {
        !name.is_empty() && !name.contains([';', '\r', '\n'])
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FileName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FileName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A modification time truncated to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.trunc_subsecs(0))
    }

    pub fn from_system_time(at: SystemTime) -> Self {
        Self::from_datetime(DateTime::<Utc>::from(at))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    /// Accepts the persisted layout and, for hand-edited records, RFC 3339
    /// with an explicit offset.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
            Ok(naive) => Ok(Self::from_datetime(naive.and_utc())),
            Err(_) => DateTime::parse_from_rfc3339(s)
                .map(|at| Self::from_datetime(at.with_timezone(&Utc))),
        }
    }
}

/// Identifier of one reconcile cycle, issued by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleId(pub u64);

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// What the state record knows about one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tracked {
    /// Seen on disk but no upload has ever been confirmed.
    NeverTracked,
    /// Last modification time whose content is known to be uploaded.
    At(Timestamp),
}

impl Tracked {
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Tracked::NeverTracked => None,
            Tracked::At(at) => Some(*at),
        }
    }
}

impl From<Timestamp> for Tracked {
    fn from(at: Timestamp) -> Self {
        Tracked::At(at)
    }
}

impl fmt::Display for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tracked::NeverTracked => f.write_str(NEVER_TRACKED),
            Tracked::At(at) => at.fmt(f),
        }
    }
}

impl FromStr for Tracked {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NEVER_TRACKED {
            return Ok(Tracked::NeverTracked);
        }
        s.parse().map(Tracked::At)
    }
}

/// Persisted record: file name → last confirmed state.
///
/// Sorted so the serialized record is stable between cycles.
pub type StateMapping = BTreeMap<FileName, Tracked>;

/// Current contents of the watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryListing {
    /// Directory the names are relative to.
    pub root: PathBuf,
    pub files: BTreeMap<FileName, Timestamp>,
}

impl DirectoryListing {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn full_path(&self, name: &FileName) -> PathBuf {
        self.root.join(&name.0)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One pending upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub file_name: FileName,
    pub full_path: PathBuf,
    /// Value restored in the state mapping if the upload fails.
    pub revert_to: Tracked,
}

/// Uploads for one cycle, in execution order.
pub type UploadPlan = Vec<UploadTask>;

/// Per-cycle context handed to every step of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleContext {
    pub id: CycleId,
    pub started_at: DateTime<Utc>,
}

impl CycleContext {
    pub fn new(id: CycleId) -> Self {
        Self {
            id,
            started_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
