//! State store: the persisted record of uploaded file versions.
//!
//! One line per tracked file:
//!
//! ```text
//! clip1.mp4;2024-01-01T10:00:00
//! clip2.mp4;never
//! ```
//!
//! Writes use the `.tmp` + rename pattern so a reader never observes a
//! truncated record.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use watchfolder_core::types::{FileName, StateMapping, Tracked};

use crate::error::{persist_err, SyncError};

/// Field separator of the state record.
pub const SEPARATOR: char = ';';

/// Handle on the state record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.tmp`, the staging file used by [`save`](Self::save).
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the state mapping.
    ///
    /// Returns an empty mapping if the record does not exist yet. Lines that
    /// do not parse are skipped.
    pub fn load(&self) -> Result<StateMapping, SyncError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StateMapping::new()),
            Err(err) => {
                return Err(SyncError::Load {
                    path: self.path.clone(),
                    source: err,
                })
            }
        };
        Ok(parse_record(&String::from_utf8_lossy(&bytes)))
    }

    /// Replace the record with `mapping`.
    pub fn save(&self, mapping: &StateMapping) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| persist_err(dir, e))?;
            }
        }

        let tmp = self.tmp_path();
        if let Err(e) = write_durably(&tmp, render_record(mapping).as_bytes()) {
            let _ = std::fs::remove_file(&tmp);
            return Err(persist_err(&tmp, e));
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(persist_err(&self.path, e));
        }
        Ok(())
    }
}

/// Write `bytes` to `path` and flush them to disk before returning, so a
/// following rename never publishes an empty file after a crash.
fn write_durably(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Parse record text. Later duplicates of a name replace earlier ones.
pub fn parse_record(text: &str) -> StateMapping {
    let mut mapping = StateMapping::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some((name, tracked)) => {
                mapping.insert(name, tracked);
            }
            None => tracing::debug!("state record line {} skipped: {:?}", index + 1, line),
        }
    }
    mapping
}

fn parse_line(line: &str) -> Option<(FileName, Tracked)> {
    let fields: Vec<&str> = line.split(SEPARATOR).collect();
    let [name, value] = fields.as_slice() else {
        return None;
    };
    if name.is_empty() {
        return None;
    }
    let tracked = value.trim().parse::<Tracked>().ok()?;
    Some((FileName::from(*name), tracked))
}

/// Render the full record text for `mapping`.
pub fn render_record(mapping: &StateMapping) -> String {
    let mut out = String::new();
    for (name, tracked) in mapping {
        out.push_str(&name.0);
        out.push(SEPARATOR);
        out.push_str(&tracked.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use watchfolder_core::types::Timestamp;

    fn ts(h: u32) -> Tracked {
        Tracked::At(Timestamp::from_datetime(
            Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn empty_mapping_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("info.txt"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("info.txt"));
        let mut mapping = StateMapping::new();
        mapping.insert(FileName::from("clip1.mp4"), ts(10));
        mapping.insert(FileName::from("clip 2.mp4"), ts(23));
        mapping.insert(FileName::from("pending.mp4"), Tracked::NeverTracked);

        store.save(&mapping).unwrap();
        assert_eq!(store.load().unwrap(), mapping);
    }

    #[test]
    fn save_writes_one_sorted_line_per_file() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("info.txt"));
        let mut mapping = StateMapping::new();
        mapping.insert(FileName::from("b.mp4"), Tracked::NeverTracked);
        mapping.insert(FileName::from("a.mp4"), ts(10));

        store.save(&mapping).unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text, "a.mp4;2024-01-01T10:00:00\nb.mp4;never\n");
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("info.txt"));
        store.save(&StateMapping::new()).unwrap();
        assert!(store.exists());
        assert!(
            !store.tmp_path().exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn leftover_tmp_from_interrupted_save_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("info.txt"));
        std::fs::write(store.tmp_path(), "half-written garbage line that is longer").unwrap();

        let mut mapping = StateMapping::new();
        mapping.insert(FileName::from("clip1.mp4"), ts(10));
        store.save(&mapping).unwrap();

        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "clip1.mp4;2024-01-01T10:00:00\n"
        );
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn save_creates_missing_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state").join("info.txt"));
        store.save(&StateMapping::new()).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "good.mp4;2024-01-01T10:00:00\n\
                    no-separator\n\
                    too;many;fields\n\
                    bad-time.mp4;1/1/2024 10:00:00 AM\n\
                    ;2024-01-01T10:00:00\n\
                    \n\
                    crlf.mp4;2024-01-01T11:00:00\r\n";
        let mapping = parse_record(text);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get(&FileName::from("good.mp4")), Some(&ts(10)));
        assert_eq!(mapping.get(&FileName::from("crlf.mp4")), Some(&ts(11)));
    }

    #[test]
    fn duplicate_names_keep_last_entry() {
        let mapping = parse_record("a.mp4;2024-01-01T10:00:00\na.mp4;never\n");
        assert_eq!(mapping.len(), 1);
        assert_eq!(
            mapping.get(&FileName::from("a.mp4")),
            Some(&Tracked::NeverTracked)
        );
    }

    #[test]
    fn failed_save_leaves_previous_record_intact() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("info.txt");
        let store = StateStore::new(&path);
        let mut mapping = StateMapping::new();
        mapping.insert(FileName::from("a.mp4"), ts(10));
        store.save(&mapping).unwrap();

        // A directory squatting on the staging path makes the write fail.
        std::fs::create_dir(store.tmp_path()).unwrap();
        let mut next = mapping.clone();
        next.insert(FileName::from("b.mp4"), ts(11));
        let err = store.save(&next).unwrap_err();
        assert!(matches!(err, SyncError::Persist { .. }), "got: {err}");

        assert_eq!(store.load().unwrap(), mapping);
    }
}
