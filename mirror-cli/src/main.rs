//! mirror: keep a directory of a git repository in sync with an external
//! archive repository.
//!
//! # Usage
//!
//! ```text
//! mirror init
//! mirror profile list|add|remove
//! mirror sync <profile> [--dry-run]
//! mirror sync --all [--dry-run]
//! mirror diff <profile>
//! mirror status [--json]
//! mirror inspect <profile> [--json]
//! mirror daemon start|stop|status|sync|logs
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, inspect::InspectArgs, profile::ProfileCommand,
    status::StatusArgs, sync::SyncArgs,
};
use mirror_core::config;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirror",
    version,
    about = "Mirror an external archive repository into a directory of a local git repository",
    long_about = None,
)]
struct Cli {
    /// Directory holding `.mirror/` (defaults to the home directory).
    #[arg(long, global = true, value_name = "DIR")]
    config_home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty config.
    Init,

    /// Manage sync profiles.
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Fetch the archive, replace the target directory, commit and push.
    Sync(SyncArgs),

    /// Show what a sync would change, without changing anything.
    Diff(DiffArgs),

    /// Show freshness of every profile.
    Status(StatusArgs),

    /// Diagnose the local repository and state of a profile.
    Inspect(InspectArgs),

    /// Run or control the scheduler daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = match cli.config_home {
        Some(dir) => dir,
        None => config::home().context("could not determine home directory")?,
    };

    // The daemon installs its own subscriber with log files.
    if !matches!(
        cli.command,
        Commands::Daemon {
            command: DaemonCommand::Start
        }
    ) {
        mirror_daemon::init_tracing(None);
    }

    match cli.command {
        Commands::Init => commands::init::run(&home),
        Commands::Profile { command } => commands::profile::run(&home, command),
        Commands::Sync(args) => args.run(&home),
        Commands::Diff(args) => args.run(&home),
        Commands::Status(args) => args.run(&home),
        Commands::Inspect(args) => args.run(&home),
        Commands::Daemon { command } => commands::daemon::run(&home, command),
    }
}
