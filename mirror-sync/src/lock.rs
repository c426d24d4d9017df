//! Run locks: skip-if-already-running across processes.
//!
//! Two locks guard a run. `<home>/.mirror/run/<profile>.lock` keeps a
//! profile from running twice; `<git-dir>/mirror-sync.lock` keeps profiles
//! that share a work tree off each other's index. Both are created with
//! `create_new`, so only one holder can exist. A lock file carries the
//! holder's pid and start time and is removed when the [`RunLock`] is
//! dropped. A lock older than [`STALE_AFTER`] is considered abandoned (the
//! holder crashed) and taken over.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mirror_core::config::mirror_root;

use crate::error::{io_err, SyncError};

/// No sync legitimately runs this long.
pub const STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Held run lock; released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

/// `<home>/.mirror/run/<profile>.lock`
pub fn lock_path_at(home: &Path, profile: &str) -> PathBuf {
    mirror_root(home).join("run").join(format!("{profile}.lock"))
}

/// `<git-dir>/mirror-sync.lock`
pub fn repo_lock_path(git_dir: &Path) -> PathBuf {
    git_dir.join("mirror-sync.lock")
}

impl RunLock {
    /// Lock `profile` against a concurrent run of itself.
    pub fn acquire(home: &Path, profile: &str) -> Result<Self, SyncError> {
        Self::acquire_path(lock_path_at(home, profile), profile, STALE_AFTER)
    }

    /// Lock the work tree behind `git_dir` on behalf of `profile`.
    pub fn acquire_repo(git_dir: &Path, profile: &str) -> Result<Self, SyncError> {
        Self::acquire_path(repo_lock_path(git_dir), profile, STALE_AFTER)
    }

    fn acquire_path(
        path: PathBuf,
        profile: &str,
        stale_after: Duration,
    ) -> Result<Self, SyncError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let busy = |lock: PathBuf| SyncError::AlreadyRunning {
            profile: profile.to_string(),
            lock,
        };

        match try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(&path, stale_after)? || !take_over_stale(&path, stale_after)? {
                    return Err(busy(path));
                }
                tracing::warn!("took over abandoned lock {}", path.display());
                try_create(&path).map_err(|err| {
                    if err.kind() == ErrorKind::AlreadyExists {
                        busy(path.clone())
                    } else {
                        io_err(&path, err)
                    }
                })
            }
            Err(err) => Err(io_err(&path, err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!("could not release lock {}: {err}", self.path.display());
            }
        }
    }
}

/// Current holder, if the lock file exists and parses.
pub fn read_holder(home: &Path, profile: &str) -> Option<LockInfo> {
    let path = lock_path_at(home, profile);
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn try_create(path: &Path) -> std::io::Result<RunLock> {
    let info = LockInfo {
        pid: std::process::id(),
        started_at: Utc::now(),
    };
    let json = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
    create_with(path, |file| file.write_all(&json))
}

/// Create the lock file exclusively and fill it; never leaves a half-made lock.
fn create_with(
    path: &Path,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<RunLock> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(err) = fill(&mut file) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(err);
    }
    Ok(RunLock {
        path: path.to_path_buf(),
    })
}

/// Move a stale lock out of the way. Of several racers only the one that
/// moves the stale file itself wins; a racer that moves a fresh lock (just
/// created by the winner) puts it back and loses.
fn take_over_stale(path: &Path, stale_after: Duration) -> Result<bool, SyncError> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".stale-{}-{nanos}", std::process::id()));
    let aside = PathBuf::from(aside);

    match std::fs::rename(path, &aside) {
        Ok(()) => {}
        // Someone else moved it first; whoever creates the new lock wins.
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(io_err(path, err)),
    }

    let won = is_stale(&aside, stale_after)?;
    if !won {
        // Restore without clobbering a lock created in the meantime.
        if let Err(err) = std::fs::hard_link(&aside, path) {
            if err.kind() != ErrorKind::AlreadyExists {
                tracing::warn!("could not restore lock {}: {err}", path.display());
            }
        }
    }
    if let Err(err) = std::fs::remove_file(&aside) {
        tracing::warn!("could not remove {}: {err}", aside.display());
    }
    Ok(won)
}

fn is_stale(path: &Path, stale_after: Duration) -> Result<bool, SyncError> {
    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(io_err(path, err)),
    };
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    Ok(age > stale_after)
}
