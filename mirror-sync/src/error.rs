//! Error types for mirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use mirror_core::ConfigError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the config layer.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (sync state, lock file).
    #[error("sync state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `git` could not be started at all.
    #[error("failed to run `git {command}`: {source}")]
    GitSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `git` ran and exited non-zero.
    #[error("`git {command}` failed: {stderr}")]
    Git { command: String, stderr: String },

    /// The archive could not be retrieved; the target directory is untouched.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The remote kept rejecting the push after every rebase-and-retry round.
    /// The local commit exists; local and remote history have diverged.
    #[error("push to {remote}/{branch} rejected after {attempts} attempt(s): {stderr}")]
    PushRejected {
        remote: String,
        branch: String,
        attempts: u32,
        stderr: String,
    },

    /// Rebasing onto the updated remote branch conflicted and was aborted.
    #[error("rebase onto {remote}/{branch} conflicted (aborted): {stderr}")]
    RebaseConflict {
        remote: String,
        branch: String,
        stderr: String,
    },

    /// Another run holds the profile's lock, or the lock of the work tree it
    /// syncs into.
    #[error("another sync holds the lock needed by '{profile}' ({lock})")]
    AlreadyRunning { profile: String, lock: PathBuf },

    /// The work tree has a different branch checked out than the profile
    /// pushes to. `checked_out` is `None` on a detached HEAD.
    #[error(
        "work tree has {} checked out but the profile pushes to '{expected}'",
        describe_checkout(.checked_out)
    )]
    BranchMismatch {
        checked_out: Option<String>,
        expected: String,
    },

    #[error("{path} is not inside a git work tree")]
    NotARepository { path: PathBuf },
}

fn describe_checkout(branch: &Option<String>) -> String {
    match branch {
        Some(branch) => format!("'{branch}'"),
        None => "a detached HEAD".to_string(),
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
