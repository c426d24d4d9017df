//! Sync orchestration: lock → recover → fetch → swap → commit → push.
//!
//! A run is a straight sequence; every step either succeeds or aborts the
//! whole run. The target directory is only touched by [`swap_in`], after the
//! archive is fully staged, so a failed fetch never leaves a partial tree.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use mirror_core::{config, SyncProfile};

use crate::error::SyncError;
use crate::fetch::fetch_snapshot;
use crate::git::{PushOutcome, Repo};
use crate::lock::RunLock;
use crate::snapshot::{Manifest, TreeDiff};
use crate::state::{self, RecordOutcome, SyncRecord};
use crate::tree::{recover_interrupted_swap, swap_in, Recovery, StagingArea};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Fetch and compare only; never touch the target, index or remote.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A commit was created and pushed.
    Updated { commit: String, push_attempts: u32 },
    /// The target already matched the archive.
    NoChanges,
    /// Dry run found differences.
    WouldUpdate,
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::NoChanges => "no changes",
            Self::WouldUpdate => "would update",
        }
    }
}

/// Result of one profile run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub profile: String,
    pub outcome: SyncOutcome,
    /// Target changes, computed from content manifests.
    pub changes: TreeDiff,
    pub source_revision: Option<String>,
    /// Files in the archive snapshot.
    pub files: usize,
    pub manifest_digest: String,
}

/// The local side of a profile, with paths resolved against the work tree.
#[derive(Debug, Clone)]
pub(crate) struct Workspace {
    pub repo: Repo,
    /// Absolute target directory.
    pub target: PathBuf,
    /// Target relative to the work tree root; used as the git pathspec.
    pub rel_target: PathBuf,
    pub git_dir: PathBuf,
    pub staging: StagingArea,
}

impl Workspace {
    pub(crate) fn open(profile: &SyncProfile) -> Result<Self, SyncError> {
        let not_repo = || SyncError::NotARepository {
            path: profile.repo.clone(),
        };
        let repo_dir = std::fs::canonicalize(&profile.repo).map_err(|_| not_repo())?;
        let repo = Repo::discover(&repo_dir)?;
        // Canonicalize both sides so symlinked temp dirs still strip cleanly.
        let root = std::fs::canonicalize(repo.root()).map_err(|_| not_repo())?;
        let rel_repo = repo_dir.strip_prefix(&root).map_err(|_| not_repo())?;
        let rel_target = rel_repo.join(&profile.target_dir);
        let target = root.join(&rel_target);
        let git_dir = repo.git_dir()?;
        let staging = StagingArea::new(&git_dir, &profile.name.0);
        Ok(Self {
            repo,
            target,
            rel_target,
            git_dir,
            staging,
        })
    }

    /// Refuse to commit or rebase on any branch but the profile's.
    pub(crate) fn ensure_on_branch(&self, expected: &str) -> Result<(), SyncError> {
        let checked_out = self.repo.current_branch()?;
        if checked_out.as_deref() == Some(expected) {
            return Ok(());
        }
        Err(SyncError::BranchMismatch {
            checked_out,
            expected: expected.to_string(),
        })
    }
}

/// Run one profile and record the outcome.
///
/// Dry runs are not recorded. A run refused because another holds the lock
/// is not recorded either; the holder records its own outcome.
pub fn sync_profile(
    home: &Path,
    profile: &SyncProfile,
    options: SyncOptions,
) -> Result<SyncReport, SyncError> {
    let name = profile.name.0.as_str();
    let _lock = RunLock::acquire(home, name)?;
    tracing::info!(
        "{name}: syncing {} into {}{}",
        profile.source.url,
        profile.target_path().display(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let result = run_locked(profile, options);

    if !options.dry_run {
        let previous = match state::load_at(home, name) {
            Ok(previous) => previous,
            Err(err) => {
                tracing::warn!("{name}: ignoring unreadable sync record: {err}");
                None
            }
        };
        let record = match &result {
            Ok(report) => record_for(report),
            Err(err) => SyncRecord::failed(err.to_string(), previous.as_ref()),
        };
        if let Err(err) = state::save_at(home, name, &record) {
            tracing::warn!("{name}: could not save sync record: {err}");
        }
    }

    match &result {
        Ok(report) => tracing::info!("{name}: {}", report.outcome.label()),
        Err(err) => tracing::error!("{name}: sync failed: {err}"),
    }
    result
}

/// Run every configured profile in name order, stopping at the first failure.
pub fn sync_all(home: &Path, options: SyncOptions) -> Result<Vec<SyncReport>, SyncError> {
    let profiles = config::list_profiles_at(home)?;
    let mut reports = Vec::new();
    for profile in &profiles {
        reports.push(sync_profile(home, profile, options)?);
    }
    Ok(reports)
}

fn run_locked(profile: &SyncProfile, options: SyncOptions) -> Result<SyncReport, SyncError> {
    let ws = Workspace::open(profile)?;
    let name = profile.name.0.as_str();
    // Profiles sharing a work tree share its index; one run at a time.
    let _repo_lock = RunLock::acquire_repo(&ws.git_dir, name)?;
    ws.ensure_on_branch(&profile.branch)?;

    match recover_interrupted_swap(&ws.staging, &ws.target)? {
        Recovery::Clean => {}
        other => tracing::warn!("{name}: recovered interrupted swap ({other:?})"),
    }

    let snapshot = fetch_snapshot(&profile.source, &ws.staging)?;
    let current = match Manifest::scan(&ws.target) {
        Ok(current) => current,
        Err(err) => {
            ws.staging.discard();
            return Err(err);
        }
    };
    let changes = TreeDiff::between(&current, &snapshot.manifest);
    let mut report = SyncReport {
        profile: name.to_string(),
        outcome: SyncOutcome::NoChanges,
        changes,
        source_revision: snapshot.revision.clone(),
        files: snapshot.manifest.len(),
        manifest_digest: snapshot.manifest.digest(),
    };

    if options.dry_run {
        ws.staging.discard();
        if !report.changes.is_empty() {
            report.outcome = SyncOutcome::WouldUpdate;
        }
        return Ok(report);
    }

    if let Err(err) = swap_in(&ws.staging, &ws.target) {
        ws.staging.discard();
        return Err(err);
    }

    ws.repo.stage(&ws.rel_target)?;
    let staged = ws.repo.staged_changes(&ws.rel_target)?;
    if staged.is_empty() {
        // A mirror commit from a run whose push failed is still owed to the remote.
        ws.repo.fetch_branch(&profile.remote, &profile.branch)?;
        let unpushed = ws.repo.unpushed_commits(
            &profile.remote,
            &profile.branch,
            &profile.author,
            &ws.rel_target,
        )?;
        if unpushed == 0 {
            return Ok(report);
        }
        tracing::warn!(
            "{name}: archive unchanged but {unpushed} local commit(s) not on {}/{}, pushing",
            profile.remote,
            profile.branch
        );
        let push_attempts = push_with_retry(&ws.repo, profile)?;
        let commit = ws.repo.head()?.ok_or_else(|| SyncError::Git {
            command: "rev-parse HEAD".to_string(),
            stderr: "HEAD missing after push".to_string(),
        })?;
        report.outcome = SyncOutcome::Updated {
            commit,
            push_attempts,
        };
        return Ok(report);
    }
    tracing::debug!("{name}: {} staged path(s)", staged.len());

    let message = profile.render_commit_message(snapshot.revision.as_deref());
    let local_commit = ws
        .repo
        .commit_path(&profile.author, &message, &ws.rel_target)?;
    tracing::info!("{name}: committed {}", short(&local_commit));

    let push_attempts = push_with_retry(&ws.repo, profile)?;
    // A rebase rewrites the local commit; report what actually landed.
    let commit = ws.repo.head()?.unwrap_or(local_commit);
    report.outcome = SyncOutcome::Updated {
        commit,
        push_attempts,
    };
    Ok(report)
}

/// Push, rebasing onto the remote and retrying while it keeps moving.
///
/// Returns the number of push attempts made.
fn push_with_retry(repo: &Repo, profile: &SyncProfile) -> Result<u32, SyncError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match repo.push(&profile.remote, &profile.branch)? {
            PushOutcome::Pushed => return Ok(attempts),
            PushOutcome::Rejected { stderr } => {
                if attempts > profile.push_retries {
                    return Err(SyncError::PushRejected {
                        remote: profile.remote.clone(),
                        branch: profile.branch.clone(),
                        attempts,
                        stderr,
                    });
                }
                tracing::warn!(
                    "{}: push to {}/{} rejected (attempt {attempts}), rebasing",
                    profile.name,
                    profile.remote,
                    profile.branch
                );
                repo.pull_rebase(&profile.remote, &profile.branch, &profile.author)?;
            }
        }
    }
}

fn record_for(report: &SyncReport) -> SyncRecord {
    let (outcome, commit) = match &report.outcome {
        SyncOutcome::Updated { commit, .. } => (RecordOutcome::Updated, Some(commit.clone())),
        SyncOutcome::NoChanges | SyncOutcome::WouldUpdate => (RecordOutcome::NoChanges, None),
    };
    SyncRecord {
        synced_at: Utc::now(),
        outcome,
        commit,
        source_revision: report.source_revision.clone(),
        files: report.files,
        manifest_digest: Some(report.manifest_digest.clone()),
        error: None,
        last_success: None,
    }
}

fn short(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_repo_is_not_a_repository() {
        let home = TempDir::new().unwrap();
        let profile = SyncProfile::new(
            "main",
            "https://example.invalid/archive.git",
            home.path().join("nope"),
            "archive",
        );
        let err = sync_profile(home.path(), &profile, SyncOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::NotARepository { .. }), "got: {err}");
    }

    #[test]
    fn failed_run_is_recorded() {
        let home = TempDir::new().unwrap();
        let profile = SyncProfile::new("main", "u", home.path().join("nope"), "archive");
        let _ = sync_profile(home.path(), &profile, SyncOptions::default());
        let record = state::load_at(home.path(), "main").unwrap().expect("record");
        assert_eq!(record.outcome, RecordOutcome::Failed);
        assert!(record.error.is_some());
    }

    #[test]
    fn dry_run_failure_is_not_recorded() {
        let home = TempDir::new().unwrap();
        let profile = SyncProfile::new("main", "u", home.path().join("nope"), "archive");
        let _ = sync_profile(home.path(), &profile, SyncOptions { dry_run: true });
        assert!(state::load_at(home.path(), "main").unwrap().is_none());
    }

    #[test]
    fn lock_is_released_after_failure() {
        let home = TempDir::new().unwrap();
        let profile = SyncProfile::new("main", "u", home.path().join("nope"), "archive");
        let _ = sync_profile(home.path(), &profile, SyncOptions::default());
        assert!(!crate::lock::lock_path_at(home.path(), "main").exists());
    }

    #[test]
    fn sync_all_without_config_is_empty() {
        let home = TempDir::new().unwrap();
        assert!(sync_all(home.path(), SyncOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(SyncOutcome::NoChanges.label(), "no changes");
        assert_eq!(
            SyncOutcome::Updated {
                commit: "c".into(),
                push_attempts: 1
            }
            .label(),
            "updated"
        );
    }
}
