//! `mirror daemon`: scheduler lifecycle and control.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use mirror_daemon::paths::{socket_path, stderr_log_path, stdout_log_path};
use mirror_daemon::{request_status, request_stop, request_sync, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the scheduler in the foreground.
    Start,
    /// Request graceful shutdown over the Unix socket.
    Stop,
    /// Query runtime status over the Unix socket.
    Status,
    /// Ask the running daemon to sync now and wait for the result.
    Sync {
        /// Profile to sync; every profile when omitted.
        profile: Option<String>,
    },
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the warnings/errors log.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(home: &Path, command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            start_blocking(home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Sync { profile } => {
            let label = profile.clone().unwrap_or_else(|| "all".to_string());
            let summary = request_sync(home, profile)
                .with_context(|| format!("daemon sync of '{label}' failed"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to render sync summary JSON")?
            );
        }
        DaemonCommand::Logs(args) => {
            if !args.stderr_only {
                print_tail(&stdout_log_path(home), args.lines)
                    .context("failed to read daemon log")?;
            }
            print_tail(&stderr_log_path(home), args.lines)
                .context("failed to read daemon error log")?;
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
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
