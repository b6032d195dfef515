//! Config error-message, atomic-write-safety, and validation integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use std::fs;
use std::path::PathBuf;
use watchfolder_core::{config, Config, ConfigError};

fn sample() -> Config {
    let mut cfg = Config::template(
        "https://uploads.example.com".to_string(),
        PathBuf::from("/srv/watch"),
        PathBuf::from("/srv/state/info.txt"),
    );
    cfg.user_id = "uploader".to_string();
    cfg.user_key = "k3y".to_string();
    cfg.folder_id = "dest".to_string();
    cfg
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config not found"));
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".watchfolder/config.yaml")
        .write_binary(b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "must contain file path, got: {err}");
}

#[test]
fn load_missing_required_field_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".watchfolder/config.yaml")
        .write_str("server: https://x\nwatch_folder: /tmp/w\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    let source_msg = match &err {
        ConfigError::Parse { source, .. } => source.to_string(),
        other => panic!("expected parse error, got {other}"),
    };
    assert!(source_msg.contains("info_file_path"), "got: {source_msg}");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_creates_file_with_private_mode() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &sample()).expect("save");

    home.child(".watchfolder/config.yaml")
        .assert(predicate::path::exists());
    home.child(".watchfolder/config.yaml.tmp")
        .assert(predicate::path::missing());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = config::config_path_at(home.path());
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

#[test]
fn mid_write_crash_leaves_original_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &sample()).expect("save");

    let path = config::config_path_at(home.path());
    let original = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(original, fs::read(&path).expect("read after crash"));
    let loaded = config::load_at(home.path()).expect("load after crash");
    assert_eq!(loaded, sample());
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

#[test]
fn template_is_valid_once_paths_and_server_are_set() {
    assert!(sample().validate().is_empty());
}

#[test]
fn validated_reports_all_fields_in_message() {
    let mut cfg = sample();
    cfg.watch_folder = PathBuf::new();
    cfg.part_size_bytes = 0;

    let err = cfg.validated().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("watch_folder"), "got: {msg}");
    assert!(msg.contains("part_size_bytes"), "got: {msg}");
}
