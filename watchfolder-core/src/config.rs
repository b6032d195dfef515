//! YAML configuration for the watch-folder daemon.
//!
//! # Storage layout
//!
//! ```text
//! ~/.watchfolder/
//!   config.yaml   (mode 0600, holds upload credentials)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the home directory has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Relative `watch_folder` / `info_file_path` values are resolved against the
//! directory holding the config file, never against the process cwd.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_DIR: &str = ".watchfolder";
pub const CONFIG_FILE: &str = "config.yaml";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_PART_SIZE_BYTES: u64 = 1_048_576;
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// Top-level daemon configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Upload endpoint base URL.
    pub server: String,
    /// State record tracking uploaded files.
    pub info_file_path: PathBuf,
    /// Directory scanned each cycle.
    pub watch_folder: PathBuf,
    pub user_id: String,
    pub user_key: String,
    /// Remote destination folder.
    pub folder_id: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// File suffix (without the dot) selecting files to upload.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_part_size_bytes")]
    pub part_size_bytes: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, or `error`. `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_part_size_bytes() -> u64 {
    DEFAULT_PART_SIZE_BYTES
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("info_file_path", &self.info_file_path)
            .field("watch_folder", &self.watch_folder)
            .field("user_id", &self.user_id)
            .field("user_key", &"<redacted>")
            .field("folder_id", &self.folder_id)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("extension", &self.extension)
            .field("part_size_bytes", &self.part_size_bytes)
            .field("logging", &self.logging)
            .finish()
    }
}

impl Config {
    /// Skeleton written by `watchfolder init`; credentials left blank.
    pub fn template(server: String, watch_folder: PathBuf, info_file_path: PathBuf) -> Self {
        Self {
            server,
            info_file_path,
            watch_folder,
            user_id: String::new(),
            user_key: String::new(),
            folder_id: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            extension: DEFAULT_EXTENSION.to_string(),
            part_size_bytes: DEFAULT_PART_SIZE_BYTES,
            logging: LoggingConfig::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.server.trim().is_empty() {
            errors.push(ValidationError::new("server", "must not be empty"));
        }
        if self.watch_folder.as_os_str().is_empty() {
            errors.push(ValidationError::new("watch_folder", "must not be empty"));
        }
        if self.info_file_path.as_os_str().is_empty() {
            errors.push(ValidationError::new("info_file_path", "must not be empty"));
        } else if self.info_file_path.file_name().is_none() {
            errors.push(ValidationError::new(
                "info_file_path",
                "must name a file, not a directory",
            ));
        }
        if self.poll_interval_ms == 0 {
            errors.push(ValidationError::new(
                "poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.part_size_bytes == 0 {
            errors.push(ValidationError::new(
                "part_size_bytes",
                "must be greater than 0",
            ));
        }
        if self.extension.is_empty() || self.extension.contains(['.', '/', '\\']) {
            errors.push(ValidationError::new(
                "extension",
                "must be a bare suffix such as 'mp4'",
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "must be one of {}, got '{}'",
                    VALID_LOG_LEVELS.join(", "),
                    self.logging.level
                ),
            ));
        }

        errors
    }

    /// `validate` as a `Result`, for startup paths where any error is fatal.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    fn resolve_relative_to(mut self, base: &Path) -> Self {
        if self.watch_folder.is_relative() && !self.watch_folder.as_os_str().is_empty() {
            self.watch_folder = base.join(&self.watch_folder);
        }
        if self.info_file_path.is_relative() && !self.info_file_path.as_os_str().is_empty() {
            self.info_file_path = base.join(&self.info_file_path);
        }
        self
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.watchfolder/`
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR)
}

/// `<home>/.watchfolder/config.yaml`, pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join(CONFIG_FILE)
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load the config file at `path`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
/// The result is not validated; call [`Config::validated`] before use.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config.resolve_relative_to(base))
}

/// Load `<home>/.watchfolder/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `config` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Atomically write `<home>/.watchfolder/config.yaml`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    save_to(&config_path_at(home), config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn io_err(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
