//! Cross-process cycle lock.
//!
//! An exclusive `flock` on `<state record>.lock`, held from load to save.
//! A second cycle on the same record blocks until the first releases it, so
//! `watchfolder sync` processes and the daemon never interleave.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{lock_err, SyncError};

/// Held for the duration of one cycle; released on drop.
#[derive(Debug)]
pub struct CycleLock {
    // Closing the descriptor releases the lock.
    _file: File,
    path: PathBuf,
}

impl CycleLock {
    /// `<state_path>.lock`. The file is left in place between cycles.
    pub fn lock_path(state_path: &Path) -> PathBuf {
        let mut name = state_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        state_path.with_file_name(name)
    }

    /// Block until this process holds the lock for `state_path`.
    pub fn acquire(state_path: &Path) -> Result<Self, SyncError> {
        let path = Self::lock_path(state_path);
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| lock_err(dir, e))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| lock_err(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                tracing::info!(
                    "another cycle holds {}; waiting for it to finish",
                    path.display()
                );
                file.lock_exclusive().map_err(|e| lock_err(&path, e))?;
            }
            Err(err) => return Err(lock_err(&path, err)),
        }

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn lock_file_sits_next_to_the_record() {
        assert_eq!(
            CycleLock::lock_path(Path::new("/data/info.txt")),
            PathBuf::from("/data/info.txt.lock")
        );
    }

    #[test]
    fn second_acquire_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("nested").join("info.txt");
        let held = CycleLock::acquire(&state).unwrap();
        assert!(held.path().exists());

        let released = Arc::new(AtomicBool::new(false));
        let waiter = {
            let state = state.clone();
            let released = released.clone();
            thread::spawn(move || {
                let _lock = CycleLock::acquire(&state).unwrap();
                released.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(150));
        released.store(true, Ordering::SeqCst);
        drop(held);

        assert!(
            waiter.join().unwrap(),
            "second holder got the lock before the first released it"
        );
    }

    #[test]
    fn lock_is_reusable_after_release() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("info.txt");
        drop(CycleLock::acquire(&state).unwrap());
        drop(CycleLock::acquire(&state).unwrap());
        assert!(!state.exists(), "locking must not create the record");
    }
}
