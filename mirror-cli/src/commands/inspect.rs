//! `mirror inspect <profile>`: diagnostics for a profile that will not sync.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_core::config;
use mirror_sync::{inspect_profile, staleness::format_datetime_age, Inspection};

use super::sync::short;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Profile to inspect.
    pub profile: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl InspectArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let profile = config::find_profile_at(home, &self.profile)
            .with_context(|| format!("unknown profile '{}'", self.profile))?;
        let report = inspect_profile(home, &profile)
            .with_context(|| format!("inspect failed for '{}'", self.profile))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize inspection")?
            );
        } else {
            print_human(&report);
        }
        Ok(())
    }
}

fn print_human(r: &Inspection) {
    let unknown = || "unknown".to_string();
    println!("{}", r.profile.bold());
    println!("  source:      {}", r.source_url);
    println!(
        "  repository:  {}",
        r.repo_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(unknown)
    );
    println!(
        "  branch:      {}",
        r.branch.clone().unwrap_or_else(|| "(detached)".to_string())
    );
    println!(
        "  HEAD:        {}",
        r.head.as_deref().map(short).unwrap_or("(no commits)")
    );
    println!(
        "  remote:      {} {}",
        r.remote,
        r.remote_url.clone().unwrap_or_else(|| "(missing)".to_string())
    );
    if let (Some(ahead), Some(behind)) = (r.ahead, r.behind) {
        println!("  divergence:  {ahead} ahead, {behind} behind (as of last fetch)");
    }
    println!("  worktree:    {} uncommitted entr(ies)", r.status_entries);
    for line in &r.status_preview {
        println!("                 {line}");
    }
    println!(
        "  target:      {} ({})",
        r.target.display(),
        match (r.target_exists, r.target_files) {
            (false, _) => "missing".to_string(),
            (true, Some(n)) => format!("{n} files"),
            (true, None) => "unreadable".to_string(),
        }
    );
    if let Some(holder) = &r.lock_holder {
        println!(
            "  lock:        held by pid {} since {}",
            holder.pid,
            holder.started_at.to_rfc3339()
        );
    }
    match &r.last_record {
        Some(record) => println!(
            "  last sync:   {} {} ago{}",
            record.outcome.as_str(),
            format_datetime_age(record.synced_at),
            record
                .error
                .as_deref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default()
        ),
        None => println!("  last sync:   never"),
    }
    println!("  freshness:   {}", r.freshness);

    if r.problems.is_empty() {
        println!("{}", "no problems found".green());
    } else {
        println!("{}", "problems:".red().bold());
        for problem in &r.problems {
            println!("  - {problem}");
        }
    }
}
