pub mod daemon;
pub mod init;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use watchfolder_core::{config, Config};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// `--config` if given, else `~/.watchfolder/config.yaml`.
pub fn config_location(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config::config_path_at(&home_dir()?)),
    }
}

/// Load and validate the configuration; any problem is fatal.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config_location(explicit)?;
    config::load_from(&path)
        .and_then(Config::validated)
        .with_context(|| {
            format!(
                "failed to load config {} (run `watchfolder init` to create one)",
                path.display()
            )
        })
}
