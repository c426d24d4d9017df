//! Staging area and atomic directory swap.
//!
//! ## Swap protocol
//!
//! 1. The new tree is fully written to `<staging>/tree` (done by the fetcher).
//! 2. `<target>` is renamed to `<staging>/previous`.
//! 3. `<staging>/tree` is renamed to `<target>`; on failure step 2 is undone.
//! 4. `<staging>/previous` is deleted.
//!
//! Staging lives under the repository's git directory, so it shares a
//! filesystem with the work tree (renames stay atomic) and never shows up in
//! `git status`. A crash between steps 2 and 3 leaves `previous` behind with
//! no `target`; [`recover_interrupted_swap`] puts it back on the next run.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

/// Per-profile scratch directory: `<git-dir>/mirror/<profile>/`.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(git_dir: &Path, profile: &str) -> Self {
        Self {
            root: git_dir.join("mirror").join(profile),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the fetched tree is written.
    pub fn tree_path(&self) -> PathBuf {
        self.root.join("tree")
    }

    /// Where the outgoing target is parked during a swap.
    pub fn previous_path(&self) -> PathBuf {
        self.root.join("previous")
    }

    /// Create the staging root and clear any tree left by a crashed fetch.
    ///
    /// Never touches `previous`; that is recovery's job.
    pub fn prepare(&self) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
        remove_if_present(&self.tree_path())
    }

    /// Best-effort removal of the staged tree.
    pub fn discard(&self) {
        if let Err(err) = remove_if_present(&self.tree_path()) {
            tracing::warn!("could not clean staging {}: {err}", self.root.display());
        }
    }
}

/// What [`recover_interrupted_swap`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Nothing pending.
    Clean,
    /// Target was missing; the parked copy was moved back.
    RestoredPrevious,
    /// The swap had completed; the leftover parked copy was deleted.
    DiscardedPrevious,
}

/// Finish or undo a swap interrupted by a crash.
pub fn recover_interrupted_swap(
    staging: &StagingArea,
    target: &Path,
) -> Result<Recovery, SyncError> {
    let previous = staging.previous_path();
    if !exists_no_follow(&previous)? {
        return Ok(Recovery::Clean);
    }

    if exists_no_follow(target)? {
        remove_if_present(&previous)?;
        tracing::warn!(
            "discarded leftover swap copy {} (target already in place)",
            previous.display()
        );
        return Ok(Recovery::DiscardedPrevious);
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::rename(&previous, target).map_err(|e| io_err(target, e))?;
    tracing::warn!(
        "restored {} from an interrupted swap",
        target.display()
    );
    Ok(Recovery::RestoredPrevious)
}

/// Whether a swap is pending recovery.
pub fn swap_pending(staging: &StagingArea) -> bool {
    exists_no_follow(&staging.previous_path()).unwrap_or(false)
}

/// Replace `target` with the staged tree.
pub fn swap_in(staging: &StagingArea, target: &Path) -> Result<(), SyncError> {
    let staged = staging.tree_path();
    let previous = staging.previous_path();

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    remove_if_present(&previous)?;

    let had_target = exists_no_follow(target)?;
    if had_target {
        std::fs::rename(target, &previous).map_err(|e| io_err(target, e))?;
    }

    if let Err(err) = std::fs::rename(&staged, target) {
        if had_target {
            if let Err(rollback) = std::fs::rename(&previous, target) {
                tracing::error!(
                    "rollback of {} failed, copy kept at {}: {rollback}",
                    target.display(),
                    previous.display()
                );
            }
        }
        return Err(io_err(target, err));
    }

    if had_target {
        if let Err(err) = remove_if_present(&previous) {
            // Content is already swapped; recovery discards this next run.
            tracing::warn!("could not remove {}: {err}", previous.display());
        }
    }
    Ok(())
}

fn exists_no_follow(path: &Path) -> Result<bool, SyncError> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(path, err)),
    }
}

fn remove_if_present(path: &Path) -> Result<(), SyncError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(io_err(path, err)),
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| io_err(path, e))
}
