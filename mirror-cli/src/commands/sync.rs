//! `mirror sync`: run one or every profile now.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use mirror_sync::{
    pipeline::{self, SyncScope},
    SyncOptions, SyncOutcome, SyncReport, TreeDiff,
};

/// Changed paths listed per kind before truncating.
const MAX_LISTED: usize = 20;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Profile to sync (omit when using `--all`).
    pub profile: Option<String>,

    /// Sync every configured profile, stopping at the first failure.
    #[arg(long, conflicts_with = "profile")]
    pub all: bool,

    /// Fetch and compare only; leave the target, history and remote alone.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let options = SyncOptions {
            dry_run: self.dry_run,
        };

        if self.all {
            let reports =
                pipeline::run(home, SyncScope::All, options).context("sync --all failed")?;
            if reports.is_empty() {
                println!("No profiles configured. Run `mirror profile add` first.");
            }
            for report in &reports {
                print_report(report);
            }
        } else {
            let name = self
                .profile
                .context("provide a profile name or use --all")?;
            let reports = pipeline::run(home, SyncScope::Profile(name.clone()), options)
                .with_context(|| format!("sync failed for '{name}'"))?;
            for report in &reports {
                print_report(report);
            }
        }
        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    let name = &report.profile;
    let revision = report
        .source_revision
        .as_deref()
        .map(short)
        .unwrap_or("unknown");
    match &report.outcome {
        SyncOutcome::Updated {
            commit,
            push_attempts,
        } => {
            println!(
                "✓ '{name}' updated ({} change(s), commit {}, source {revision})",
                report.changes.total(),
                short(commit)
            );
            if *push_attempts > 1 {
                println!("  pushed after {push_attempts} attempts");
            }
            print_changes(&report.changes);
        }
        SyncOutcome::NoChanges => {
            println!("✓ '{name}' no changes ({} files, source {revision})", report.files);
        }
        SyncOutcome::WouldUpdate => {
            println!(
                "[dry-run] ~ '{name}' would update (+{} ~{} -{}, source {revision})",
                report.changes.added.len(),
                report.changes.modified.len(),
                report.changes.removed.len()
            );
            print_changes(&report.changes);
        }
    }
}

pub(crate) fn print_changes(changes: &TreeDiff) {
    for (marker, paths) in [
        ("+", &changes.added),
        ("~", &changes.modified),
        ("-", &changes.removed),
    ] {
        for path in paths.iter().take(MAX_LISTED) {
            println!("  {marker}  {path}");
        }
        if paths.len() > MAX_LISTED {
            println!("  {marker}  … {} more", paths.len() - MAX_LISTED);
        }
    }
}

pub(crate) fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
