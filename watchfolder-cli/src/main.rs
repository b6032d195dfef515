//! Watchfolder: upload new and modified files from a watched directory.
//!
//! # Usage
//!
//! ```text
//! watchfolder init --server <url> --watch-folder <dir> [--info-file <path>] [--force]
//! watchfolder sync [--dry-run] [--json]
//! watchfolder status [--json]
//! watchfolder daemon start|stop|status|logs
//! ```
//!
//! Every command accepts `--config <path>`; the default is
//! `~/.watchfolder/config.yaml`.

mod commands;
mod uploader;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, init::InitArgs, status::StatusArgs, sync::SyncArgs};

#[derive(Parser, Debug)]
#[command(
    name = "watchfolder",
    version,
    about = "Upload new and modified files from a watched directory",
    long_about = None,
)]
struct Cli {
    /// Config file to use instead of ~/.watchfolder/config.yaml.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration file.
    Init(InitArgs),

    /// Run one upload cycle now.
    Sync(SyncArgs),

    /// Compare the state record with the watched directory.
    Status(StatusArgs),

    /// Run or control the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init(args) => args.run(config),
        Commands::Sync(args) => args.run(config),
        Commands::Status(args) => args.run(config),
        Commands::Daemon { command } => commands::daemon::run(command, config),
    }
}
