use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use serde_json::Value;
use tempfile::TempDir;
use watchfolder_core::Config;
use watchfolder_daemon::paths::socket_path;
use watchfolder_daemon::{request_status, request_stop, request_sync, run, DaemonError};
use watchfolder_sync::{UploadError, UploadRequest, Uploader};

struct CountingUploader(AtomicUsize);

impl Uploader for CountingUploader {
    fn upload(&self, _request: &UploadRequest<'_>) -> Result<(), UploadError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config_for(home: &Path, poll_interval_ms: u64) -> Config {
    let watch = home.join("incoming");
    fs::create_dir_all(&watch).expect("mkdir watch");
    let clip = watch.join("clip1.mp4");
    fs::write(&clip, b"frames").expect("write clip");
    set_file_mtime(&clip, FileTime::from_unix_time(1_704_103_200, 0)).expect("mtime");

    let mut config = Config::template(
        "http://127.0.0.1:1".to_string(),
        watch,
        home.join("info.txt"),
    );
    config.poll_interval_ms = poll_interval_ms;
    config
}

async fn wait_for_socket(home: &Path) {
    let socket = socket_path(home);
    for _ in 0..200 {
        if socket.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("daemon socket never appeared at {}", socket.display());
}

async fn blocking<T: Send + 'static>(
    home: &Path,
    call: fn(&Path) -> Result<T, DaemonError>,
) -> Result<T, DaemonError> {
    let home: PathBuf = home.to_path_buf();
    tokio::task::spawn_blocking(move || call(&home))
        .await
        .expect("join")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_status_and_stop_over_socket() {
    let home = TempDir::new().expect("home");
    let config = config_for(home.path(), 600_000);
    let state_path = config.info_file_path.clone();
    let uploader = Arc::new(CountingUploader(AtomicUsize::new(0)));

    let daemon = tokio::spawn(run(home.path().to_path_buf(), config, uploader.clone()));
    wait_for_socket(home.path()).await;

    let summary: Value = blocking(home.path(), request_sync).await.expect("sync");
    assert_eq!(summary["cycle_id"], 1);
    assert_eq!(summary["source"], "socket");
    assert_eq!(summary["report"]["uploaded"], 1);
    assert_eq!(
        fs::read_to_string(&state_path).expect("record"),
        "clip1.mp4;2024-01-01T10:00:00\n"
    );

    let status: Value = blocking(home.path(), request_status).await.expect("status");
    assert_eq!(status["running"], true);
    assert_eq!(status["state"], "idle");
    assert_eq!(status["cycles_completed"], 1);
    assert_eq!(status["last_cycle"]["cycle_id"], 1);

    blocking(home.path(), request_stop).await.expect("stop");
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon exits after stop")
        .expect("join")
        .expect("clean exit");

    assert_eq!(uploader.0.load(Ordering::SeqCst), 1);
    assert!(!socket_path(home.path()).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ticker_uploads_without_being_asked() {
    let home = TempDir::new().expect("home");
    let config = config_for(home.path(), 50);
    let state_path = config.info_file_path.clone();
    let uploader = Arc::new(CountingUploader(AtomicUsize::new(0)));

    let daemon = tokio::spawn(run(home.path().to_path_buf(), config, uploader.clone()));
    wait_for_socket(home.path()).await;

    let mut recorded = String::new();
    for _ in 0..200 {
        recorded = fs::read_to_string(&state_path).unwrap_or_default();
        if !recorded.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(recorded, "clip1.mp4;2024-01-01T10:00:00\n");

    // Later ticks find nothing new.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(uploader.0.load(Ordering::SeqCst), 1);

    blocking(home.path(), request_stop).await.expect("stop");
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon exits after stop")
        .expect("join")
        .expect("clean exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_command_is_rejected() {
    use watchfolder_daemon::{send_request, DaemonRequest};

    let home = TempDir::new().expect("home");
    let config = config_for(home.path(), 600_000);
    let uploader = Arc::new(CountingUploader(AtomicUsize::new(0)));
    let daemon = tokio::spawn(run(home.path().to_path_buf(), config, uploader));
    wait_for_socket(home.path()).await;

    let path = home.path().to_path_buf();
    let response = tokio::task::spawn_blocking(move || {
        send_request(&path, &DaemonRequest::new("reboot"))
    })
    .await
    .expect("join")
    .expect("response");
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("unknown command 'reboot'"));

    blocking(home.path(), request_stop).await.expect("stop");
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon exits after stop")
        .expect("join")
        .expect("clean exit");
}
