//! `watchfolder daemon`: foreground runtime and control-socket client.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use watchfolder_daemon::paths::{log_path, socket_path};
use watchfolder_daemon::{request_status, request_stop, start_blocking, DaemonError};

use crate::uploader::HttpUploader;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (poll ticker + control socket).
    Start,
    /// Request graceful daemon shutdown over the control socket.
    Stop,
    /// Query daemon runtime status over the control socket.
    Status,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,
}

pub fn run(command: DaemonCommand, explicit_config: Option<&Path>) -> Result<()> {
    let home = super::home_dir()?;

    match command {
        DaemonCommand::Start => {
            let config = super::load_config(explicit_config)?;
            let uploader = Arc::new(HttpUploader::new(&config.server));
            start_blocking(&home, config, uploader).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Logs(args) => {
            print_tail(&log_path(&home), args.lines).context("failed to read daemon log")?;
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        if lines > 0 {
            tail.push_back(line);
        }
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
