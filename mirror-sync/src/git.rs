//! Thin wrapper over the system `git` binary.
//!
//! Using the CLI keeps SSH keys, credential helpers and `~/.gitconfig`
//! working exactly as they do for a human operator. Every invocation runs
//! with `GIT_TERMINAL_PROMPT=0` so an unattended run fails instead of
//! blocking on a password prompt.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use mirror_core::CommitAuthor;

use crate::error::SyncError;

/// Kind of change reported by `git diff --name-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    TypeChanged,
    Other(char),
}

impl ChangeKind {
    fn from_code(code: char) -> Self {
        match code {
            'A' => Self::Added,
            'M' => Self::Modified,
            'D' => Self::Deleted,
            'T' => Self::TypeChanged,
            other => Self::Other(other),
        }
    }
}

/// One staged path change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub kind: ChangeKind,
    pub path: String,
}

/// Result of a single push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The remote refused a non-fast-forward update.
    Rejected { stderr: String },
}

/// A local git work tree.
#[derive(Debug, Clone)]
pub struct Repo {
    root: PathBuf,
}

impl Repo {
    /// Resolve the work tree containing `path`.
    pub fn discover(path: &Path) -> Result<Self, SyncError> {
        let output = run_git(Some(path), ["rev-parse", "--show-toplevel"])?;
        if !output.status.success() {
            return Err(SyncError::NotARepository {
                path: path.to_path_buf(),
            });
        }
        let root = stdout_line(&output);
        Ok(Self {
            root: PathBuf::from(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute `.git` directory (handles worktrees where `.git` is a file).
    pub fn git_dir(&self) -> Result<PathBuf, SyncError> {
        self.run(["rev-parse", "--absolute-git-dir"])
            .map(PathBuf::from)
    }

    /// `HEAD` commit id, or `None` on an unborn branch.
    pub fn head(&self) -> Result<Option<String>, SyncError> {
        let output = self.output(["rev-parse", "--verify", "-q", "HEAD"])?;
        if output.status.success() {
            Ok(Some(stdout_line(&output)))
        } else {
            Ok(None)
        }
    }

    /// Checked-out branch name, or `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>, SyncError> {
        let output = self.output(["symbolic-ref", "--short", "-q", "HEAD"])?;
        if output.status.success() {
            Ok(Some(stdout_line(&output)))
        } else {
            Ok(None)
        }
    }

    pub fn remote_url(&self, remote: &str) -> Result<Option<String>, SyncError> {
        let output = self.output(["remote", "get-url", remote])?;
        if output.status.success() {
            Ok(Some(stdout_line(&output)))
        } else {
            Ok(None)
        }
    }

    /// Commits ahead of / behind `<remote>/<branch>` as last fetched.
    pub fn ahead_behind(&self, remote: &str, branch: &str) -> Result<Option<(u32, u32)>, SyncError> {
        let range = format!("HEAD...{remote}/{branch}");
        let output = self.output(["rev-list", "--left-right", "--count", range.as_str()])?;
        if !output.status.success() {
            return Ok(None);
        }
        let line = stdout_line(&output);
        let mut parts = line.split_whitespace().map(str::parse::<u32>);
        match (parts.next(), parts.next()) {
            (Some(Ok(ahead)), Some(Ok(behind))) => Ok(Some((ahead, behind))),
            _ => Ok(None),
        }
    }

    /// `git status --porcelain` lines.
    pub fn status_porcelain(&self) -> Result<Vec<String>, SyncError> {
        let out = self.run(["-c", "core.quotePath=false", "status", "--porcelain"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Stage every addition, modification and deletion under `path`.
    pub fn stage(&self, path: &Path) -> Result<(), SyncError> {
        self.run([
            OsStr::new("add"),
            OsStr::new("-A"),
            OsStr::new("--"),
            path.as_os_str(),
        ])?;
        Ok(())
    }

    /// Staged changes under `path` relative to `HEAD`.
    pub fn staged_changes(&self, path: &Path) -> Result<Vec<PathChange>, SyncError> {
        let output = self.output([
            OsStr::new("diff"),
            OsStr::new("--cached"),
            OsStr::new("--name-status"),
            OsStr::new("--no-renames"),
            OsStr::new("-z"),
            OsStr::new("--"),
            path.as_os_str(),
        ])?;
        if !output.status.success() {
            return Err(git_failure("diff --cached", &output));
        }
        Ok(parse_name_status(&output.stdout))
    }

    /// Commit only `path` and return the new commit id.
    pub fn commit_path(
        &self,
        author: &CommitAuthor,
        message: &str,
        path: &Path,
    ) -> Result<String, SyncError> {
        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        self.run([
            OsStr::new("-c"),
            OsStr::new(&name),
            OsStr::new("-c"),
            OsStr::new(&email),
            OsStr::new("-c"),
            OsStr::new("commit.gpgsign=false"),
            OsStr::new("commit"),
            OsStr::new("--no-verify"),
            OsStr::new("-q"),
            OsStr::new("-m"),
            OsStr::new(message),
            OsStr::new("--"),
            path.as_os_str(),
        ])?;
        self.head()?.ok_or_else(|| SyncError::Git {
            command: "commit".to_string(),
            stderr: "HEAD missing after commit".to_string(),
        })
    }

    /// Push `HEAD` to `<remote>` as `<branch>`.
    pub fn push(&self, remote: &str, branch: &str) -> Result<PushOutcome, SyncError> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        let output = self.output(["push", remote, refspec.as_str()])?;
        if output.status.success() {
            return Ok(PushOutcome::Pushed);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_push_rejection(&stderr) {
            Ok(PushOutcome::Rejected { stderr })
        } else {
            Err(SyncError::Git {
                command: format!("push {remote} {refspec}"),
                stderr,
            })
        }
    }

    /// Refresh `<remote>/<branch>`. `false` when the remote has no such branch.
    pub fn fetch_branch(&self, remote: &str, branch: &str) -> Result<bool, SyncError> {
        let output = self.output(["fetch", "-q", remote, branch])?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("couldn't find remote ref") {
            return Ok(false);
        }
        Err(git_failure(&format!("fetch {remote} {branch}"), &output))
    }

    /// Commits by `author` touching `path` that `<remote>/<branch>` lacks.
    ///
    /// Looks at all of `HEAD` when the remote branch is unknown locally.
    pub fn unpushed_commits(
        &self,
        remote: &str,
        branch: &str,
        author: &CommitAuthor,
        path: &Path,
    ) -> Result<u32, SyncError> {
        let tracking = format!("refs/remotes/{remote}/{branch}");
        let known = self
            .output(["rev-parse", "--verify", "-q", tracking.as_str()])?
            .status
            .success();
        let range = if known {
            format!("{tracking}..HEAD")
        } else {
            "HEAD".to_string()
        };
        let author = format!("--author=<{}>", author.email);
        let count = self.run([
            OsStr::new("rev-list"),
            OsStr::new("--count"),
            OsStr::new("--fixed-strings"),
            OsStr::new(&author),
            OsStr::new(&range),
            OsStr::new("--"),
            path.as_os_str(),
        ])?;
        count.trim().parse().map_err(|_| SyncError::Git {
            command: format!("rev-list --count {range}"),
            stderr: format!("unexpected output '{count}'"),
        })
    }

    /// `git pull --rebase` onto `<remote>/<branch>`, aborting on conflict.
    pub fn pull_rebase(
        &self,
        remote: &str,
        branch: &str,
        author: &CommitAuthor,
    ) -> Result<(), SyncError> {
        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        let output = self.output([
            "-c",
            name.as_str(),
            "-c",
            email.as_str(),
            "-c",
            "commit.gpgsign=false",
            "pull",
            "--rebase",
            "--autostash",
            remote,
            branch,
        ])?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let git_dir = self.git_dir()?;
        if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
            let abort = self.output(["rebase", "--abort"])?;
            if !abort.status.success() {
                tracing::warn!(
                    "rebase --abort failed in {}: {}",
                    self.root.display(),
                    String::from_utf8_lossy(&abort.stderr).trim()
                );
            }
            return Err(SyncError::RebaseConflict {
                remote: remote.to_string(),
                branch: branch.to_string(),
                stderr,
            });
        }
        Err(SyncError::Git {
            command: format!("pull --rebase {remote} {branch}"),
            stderr,
        })
    }

    fn output<I, S>(&self, args: I) -> Result<Output, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_git(Some(&self.root), args)
    }

    /// Run and require success; returns trimmed stdout.
    fn run<I, S>(&self, args: I) -> Result<String, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let output = self.output(args.iter())?;
        if !output.status.success() {
            return Err(git_failure(&describe(&args), &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

/// Shallow-clone `url` (optionally at `git_ref`) into `dest`.
///
/// `dest` must not exist or be empty.
pub fn clone_shallow(url: &str, git_ref: Option<&str>, dest: &Path) -> Result<(), SyncError> {
    let mut args: Vec<&OsStr> = vec![
        OsStr::new("clone"),
        OsStr::new("--depth=1"),
        OsStr::new("--single-branch"),
        OsStr::new("--no-tags"),
        OsStr::new("--quiet"),
    ];
    if let Some(git_ref) = git_ref {
        args.push(OsStr::new("--branch"));
        args.push(OsStr::new(git_ref));
    }
    args.push(OsStr::new(url));
    args.push(dest.as_os_str());

    let output = run_git(None, args).map_err(|e| SyncError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.contains("Authentication failed")
            || stderr.contains("Permission denied")
            || stderr.contains("could not read Username")
            || stderr.contains("Could not read from remote repository")
        {
            format!(
                "authentication failed; check SSH keys, credential helpers or tokens for this URL\n{}",
                stderr.trim()
            )
        } else {
            stderr.trim().to_string()
        };
        return Err(SyncError::Fetch {
            url: url.to_string(),
            message,
        });
    }
    Ok(())
}

/// `HEAD` commit id of the repository at `dir`.
pub fn rev_parse_head(dir: &Path) -> Result<String, SyncError> {
    let output = run_git(Some(dir), ["rev-parse", "HEAD"])?;
    if !output.status.success() {
        return Err(git_failure("rev-parse HEAD", &output));
    }
    Ok(stdout_line(&output))
}

/// Whether a failed push's stderr describes a non-fast-forward rejection.
pub fn is_push_rejection(stderr: &str) -> bool {
    stderr.contains("[rejected]")
        || stderr.contains("non-fast-forward")
        || stderr.contains("fetch first")
        || (stderr.contains("[remote rejected]") && stderr.contains("cannot lock ref"))
}

/// Parse `git diff --name-status -z` output.
pub fn parse_name_status(raw: &[u8]) -> Vec<PathChange> {
    let text = String::from_utf8_lossy(raw);
    let mut fields = text.split('\0').filter(|f| !f.is_empty());
    let mut changes = Vec::new();
    while let (Some(status), Some(path)) = (fields.next(), fields.next()) {
        let code = status.chars().next().unwrap_or('?');
        changes.push(PathChange {
            kind: ChangeKind::from_code(code),
            path: path.to_string(),
        });
    }
    changes
}

fn run_git<I, S>(dir: Option<&Path>, args: I) -> Result<Output, SyncError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.args(args.iter())
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C");
    tracing::debug!("git {}", describe(&args));
    cmd.output().map_err(|source| SyncError::GitSpawn {
        command: describe(&args),
        source,
    })
}

fn describe<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn git_failure(command: &str, output: &Output) -> SyncError {
    SyncError::Git {
        command: command.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_name_status_pairs() {
        let raw = b"M\0data/a.txt\0A\0data/new file.json\0D\0data/old.csv\0";
        let changes = parse_name_status(raw);
        assert_eq!(
            changes,
            vec![
                PathChange {
                    kind: ChangeKind::Modified,
                    path: "data/a.txt".to_string()
                },
                PathChange {
                    kind: ChangeKind::Added,
                    path: "data/new file.json".to_string()
                },
                PathChange {
                    kind: ChangeKind::Deleted,
                    path: "data/old.csv".to_string()
                },
            ]
        );
    }

    #[test]
    fn empty_name_status_is_no_changes() {
        assert!(parse_name_status(b"").is_empty());
    }

    #[test]
    fn recognises_rejected_pushes() {
        let stderr = "To /tmp/remote.git\n ! [rejected]        HEAD -> main (fetch first)\n\
                      error: failed to push some refs to '/tmp/remote.git'";
        assert!(is_push_rejection(stderr));
        assert!(is_push_rejection(" ! [rejected] HEAD -> main (non-fast-forward)"));
        assert!(!is_push_rejection("fatal: 'nope' does not appear to be a git repository"));
    }

    #[test]
    fn discover_outside_repo_is_not_a_repository() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("plain");
        std::fs::create_dir_all(&nested).unwrap();
        // A temp dir could live inside some checkout; only assert when it doesn't.
        if let Err(err) = Repo::discover(&nested) {
            assert!(matches!(err, SyncError::NotARepository { .. }), "got: {err}");
        }
    }

    #[test]
    fn clone_of_missing_source_is_a_fetch_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        let url = format!("file://{}", missing.display());
        let err = clone_shallow(&url, None, &dir.path().join("dest")).unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }), "got: {err}");
    }
}
