//! Diagnostics for `mirror inspect`.
//!
//! Gathers everything an operator needs to understand why a profile is not
//! syncing. Individual probes that fail are reported in `problems` instead
//! of aborting, so a half-broken setup still produces a useful report.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use mirror_core::SyncProfile;

use crate::lock::{self, LockInfo};
use crate::snapshot::Manifest;
use crate::staleness;
use crate::state::{self, SyncRecord};
use crate::syncer::Workspace;
use crate::tree::swap_pending;
use crate::SyncError;

/// Porcelain status lines shown before truncating.
const STATUS_PREVIEW: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Inspection {
    pub profile: String,
    pub source_url: String,
    pub repo_root: Option<PathBuf>,
    pub git_dir: Option<PathBuf>,
    pub branch: Option<String>,
    pub head: Option<String>,
    pub remote: String,
    pub remote_url: Option<String>,
    /// Commits ahead of / behind `<remote>/<branch>` as last fetched.
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
    pub status_entries: usize,
    pub status_preview: Vec<String>,
    pub target: PathBuf,
    pub target_exists: bool,
    pub target_files: Option<usize>,
    pub swap_pending: bool,
    pub lock_holder: Option<LockInfo>,
    pub last_record: Option<SyncRecord>,
    pub freshness: String,
    pub problems: Vec<String>,
}

/// Inspect the local state of `profile`. Never modifies anything.
pub fn inspect_profile(home: &Path, profile: &SyncProfile) -> Result<Inspection, SyncError> {
    let name = profile.name.0.as_str();
    let mut report = Inspection {
        profile: name.to_string(),
        source_url: profile.source.url.clone(),
        remote: profile.remote.clone(),
        target: profile.target_path(),
        lock_holder: lock::read_holder(home, name),
        ..Inspection::default()
    };

    match state::load_at(home, name) {
        Ok(record) => report.last_record = record,
        Err(err) => report.problems.push(format!("sync record unreadable: {err}")),
    }
    report.freshness = staleness::check(report.last_record.as_ref(), &profile.schedule, Utc::now())
        .label()
        .to_string();

    let ws = match Workspace::open(profile) {
        Ok(ws) => ws,
        Err(err) => {
            report.problems.push(err.to_string());
            return Ok(report);
        }
    };
    report.repo_root = Some(ws.repo.root().to_path_buf());
    report.target = ws.target.clone();
    report.swap_pending = swap_pending(&ws.staging);
    if report.swap_pending {
        report
            .problems
            .push("an interrupted swap will be recovered on the next run".to_string());
    }

    let repo = &ws.repo;
    report.git_dir = probe(&mut report.problems, "git dir", || repo.git_dir());
    report.branch = probe(&mut report.problems, "branch", || repo.current_branch()).flatten();
    report.head = probe(&mut report.problems, "HEAD", || repo.head()).flatten();
    report.remote_url =
        probe(&mut report.problems, "remote", || repo.remote_url(&profile.remote)).flatten();
    if report.remote_url.is_none() {
        report
            .problems
            .push(format!("remote '{}' is not configured", profile.remote));
    }
    if let Some((ahead, behind)) = probe(&mut report.problems, "ahead/behind", || {
        repo.ahead_behind(&profile.remote, &profile.branch)
    })
    .flatten()
    {
        report.ahead = Some(ahead);
        report.behind = Some(behind);
    }
    if let Some(branch) = &report.branch {
        if branch != &profile.branch {
            report.problems.push(format!(
                "checked out '{branch}' but profile pushes to '{}'",
                profile.branch
            ));
        }
    }
    if let Some(lines) = probe(&mut report.problems, "status", || repo.status_porcelain()) {
        report.status_entries = lines.len();
        report.status_preview = lines.into_iter().take(STATUS_PREVIEW).collect();
    }

    report.target_exists = ws.target.is_dir();
    if report.target_exists {
        report.target_files = probe(&mut report.problems, "target scan", || {
            Manifest::scan(&ws.target).map(|m| m.len())
        });
    }

    Ok(report)
}

fn probe<T>(
    problems: &mut Vec<String>,
    what: &str,
    f: impl FnOnce() -> Result<T, SyncError>,
) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(err) => {
            problems.push(format!("{what}: {err}"));
            None
        }
    }
}
