//! Runtime file locations, all under `~/.watchfolder/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use watchfolder_core::config::config_dir_at;

pub const DAEMON_LOG: &str = "daemon.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";

/// How often the rotation task checks the log size.
pub const LOG_ROTATION_PERIOD: Duration = Duration::from_secs(60);

pub fn socket_path(home: &Path) -> PathBuf {
    config_dir_at(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    config_dir_at(home).join("logs")
}

pub fn log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_LOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_files_live_under_config_dir() {
        let home = Path::new("/home/op");
        assert_eq!(
            socket_path(home),
            PathBuf::from("/home/op/.watchfolder/daemon.sock")
        );
        assert_eq!(
            log_path(home),
            PathBuf::from("/home/op/.watchfolder/logs/daemon.log")
        );
    }
}
