//! `watchfolder init --server <url> --watch-folder <dir>`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use watchfolder_core::{config, Config};

/// Write a starter configuration file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Upload endpoint base URL, e.g. https://media.example.com
    #[arg(long)]
    pub server: String,

    /// Directory to watch for new and modified files.
    #[arg(long, value_name = "DIR")]
    pub watch_folder: PathBuf,

    /// State record location. Defaults to info.txt next to the config file.
    #[arg(long, value_name = "PATH")]
    pub info_file: Option<PathBuf>,

    #[arg(long)]
    pub user_id: Option<String>,

    #[arg(long)]
    pub user_key: Option<String>,

    /// Remote folder receiving the uploads.
    #[arg(long)]
    pub folder_id: Option<String>,

    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, explicit_config: Option<&Path>) -> Result<()> {
        let path = super::config_location(explicit_config)?;
        if path.exists() && !self.force {
            bail!(
                "config already exists at {} (use --force to overwrite)",
                path.display()
            );
        }

        let base = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let info_file = self.info_file.unwrap_or_else(|| base.join("info.txt"));

        let mut cfg = Config::template(
            self.server,
            absolute(&self.watch_folder)?,
            absolute(&info_file)?,
        );
        cfg.user_id = self.user_id.unwrap_or_default();
        cfg.user_key = self.user_key.unwrap_or_default();
        cfg.folder_id = self.folder_id.unwrap_or_default();
        let cfg = cfg.validated().context("refusing to write an invalid config")?;

        config::save_to(&path, &cfg)
            .with_context(|| format!("failed to write {}", path.display()))?;

        println!("✓ Wrote {}", path.display());
        println!("  watching: {}", cfg.watch_folder.display());
        println!("  state record: {}", cfg.info_file_path.display());
        if cfg.user_id.is_empty() || cfg.user_key.is_empty() || cfg.folder_id.is_empty() {
            println!("  fill in user_id, user_key and folder_id before the first sync");
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    Ok(cwd.join(path))
}
